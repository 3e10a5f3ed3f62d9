// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parser::parse()                 │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validator::validate()           │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `parser` - CLI structure and clap parsing
//! - `validator` - Security validation layer

pub mod parser;
pub mod validator;

pub use parser::{parse_cli, Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

/// Validated CLI configuration
///
/// Holds all CLI arguments after security validation. Manifest and input
/// paths are canonicalized; numeric overrides are range-checked.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub worker_threads: Option<usize>,
}

/// Validated command variants
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Run {
        manifest: PathBuf,
        input: PathBuf,
        version_tag: Option<String>,
        replay: String,
        cache_policy: String,
    },
    Validate {
        manifest: PathBuf,
    },
    Inspect {
        manifest: PathBuf,
    },
}

/// Parse and validate CLI arguments
///
/// # Errors
///
/// Returns `ParseError` if CLI parsing or validation fails.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

/// Validate parsed CLI arguments
fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = if let Some(ref path) = cli.config {
        SecureArgParser::validate_argument(&path.to_string_lossy())?;
        Some(path.clone())
    } else {
        None
    };

    if let Some(threads) = cli.worker_threads {
        if threads == 0 || threads > 1024 {
            return Err(ParseError::InvalidValue {
                arg: "worker-threads".to_string(),
                reason: "must be between 1 and 1024".to_string(),
            });
        }
    }

    let command = match cli.command {
        Commands::Run {
            manifest,
            input,
            version_tag,
            replay,
            cache_policy,
        } => {
            let validated_manifest = SecureArgParser::validate_path(&manifest.to_string_lossy())?;
            let validated_input = SecureArgParser::validate_path(&input.to_string_lossy())?;

            if let Some(ref tag) = version_tag {
                SecureArgParser::validate_argument(tag)?;
            }

            ValidatedCommand::Run {
                manifest: validated_manifest,
                input: validated_input,
                version_tag,
                replay,
                cache_policy,
            }
        }
        Commands::Validate { manifest } => {
            let validated_manifest = SecureArgParser::validate_path(&manifest.to_string_lossy())?;
            ValidatedCommand::Validate {
                manifest: validated_manifest,
            }
        }
        Commands::Inspect { manifest } => {
            let validated_manifest = SecureArgParser::validate_path(&manifest.to_string_lossy())?;
            ValidatedCommand::Inspect {
                manifest: validated_manifest,
            }
        }
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config,
        worker_threads: cli.worker_threads,
    })
}
