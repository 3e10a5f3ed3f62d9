// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Parser
//!
//! Command-line interface parsing using clap.
//!
//! This module defines the CLI structure and handles argument parsing.
//! Security validation happens in the validator module after parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser, Debug, Clone)]
#[command(name = "pipeline-bootstrap")]
#[command(about = concat!("Reactive pipeline runtime v", env!("CARGO_PKG_VERSION")))]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (`pipeline.*` keys, see config module)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the fixed worker pool size (default: host CPU count)
    #[arg(long)]
    pub worker_threads: Option<usize>,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a pipeline descriptor against a single JSON input value
    Run {
        /// Pipeline descriptor file (YAML or JSON, deserializes to
        /// `PipelineDescriptor`)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Input value file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Version tag namespacing cache keys for this run
        #[arg(long)]
        version_tag: Option<String>,

        /// Replay mode: off, dry, or live
        #[arg(long, value_parser = parse_replay_mode, default_value = "off")]
        replay: String,

        /// Cache policy: bypass-cache, prefer-cache, require-cache, or the
        /// return-cached synonym
        #[arg(long, value_parser = parse_cache_policy, default_value = "prefer-cache")]
        cache_policy: String,
    },

    /// Load a pipeline descriptor and report structural validation errors
    /// without running it
    Validate {
        /// Pipeline descriptor file to validate
        manifest: PathBuf,
    },

    /// Print a pipeline descriptor's step sequence and aspect summary
    Inspect {
        /// Pipeline descriptor file to inspect
        manifest: PathBuf,
    },
}

/// Parse and validate replay mode from CLI argument
fn parse_replay_mode(s: &str) -> Result<String, String> {
    match s.to_lowercase().as_str() {
        "off" | "dry" | "live" => Ok(s.to_lowercase()),
        _ => Err(format!("Invalid replay mode '{}'. Valid options: off, dry, live", s)),
    }
}

/// Parse and validate cache policy from CLI argument
fn parse_cache_policy(s: &str) -> Result<String, String> {
    match s.to_lowercase().as_str() {
        "bypass-cache" | "prefer-cache" | "require-cache" | "return-cached" => Ok(s.to_lowercase()),
        _ => Err(format!(
            "Invalid cache policy '{}'. Valid options: bypass-cache, prefer-cache, require-cache",
            s
        )),
    }
}

/// Parse CLI arguments
///
/// # Panics
///
/// Clap will exit the process with appropriate error message if parsing fails
pub fn parse_cli() -> Cli {
    Cli::parse()
}
