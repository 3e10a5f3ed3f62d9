// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Standardized Unix exit codes following BSD `sysexits.h` conventions,
//! plus a direct mapping from the domain's `PipelineError` taxonomy
//! so a terminated run always produces a stable, scriptable exit
//! status instead of the generic `1`.
//!
//! ## Exit Code Conventions
//!
//! - **0**: Success
//! - **1**: General error
//! - **64-78**: Specific error conditions (BSD sysexits.h)
//! - **128+N**: Fatal signal N (e.g., 130 = SIGINT)

use std::fmt;

use pipeline_domain::PipelineError;

/// Exit codes following Unix conventions (BSD sysexits.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General error (1)
    Error = 1,

    /// Command line usage error (64)
    UsageError = 64,

    /// Data format error (65): malformed manifest, malformed JSON input
    DataError = 65,

    /// Cannot open input (66): manifest or input file not found
    NoInput = 66,

    /// Service unavailable (69): a transport or cache backend is
    /// unreachable
    Unavailable = 69,

    /// Internal software error (70)
    Software = 70,

    /// Temporary failure, retry (75): `TransientExhausted` after bounded
    /// backoff
    TempFail = 75,

    /// Remote error in protocol (76): permanent `TransportError`
    Protocol = 76,

    /// Configuration error (78): `InvalidConfiguration`, `PolicyViolation`
    Config = 78,

    /// Interrupted by signal (SIGINT - Ctrl+C) (130)
    Interrupted = 130,

    /// Terminated by signal (SIGTERM) (143)
    Terminated = 143,
}

impl ExitCode {
    /// Convert to i32 for use with std::process::exit
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a terminal `PipelineError` to its exit code.
    ///
    /// Mirrors the error taxonomy: policy and configuration failures exit
    /// distinctly from exhausted-retry and protocol failures, so callers
    /// can distinguish "fix your manifest" from "retry me" without
    /// parsing the error message.
    pub fn from_pipeline_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::ValidationError(_) | PipelineError::MappingError(_) => ExitCode::DataError,
            PipelineError::PolicyViolation(_) | PipelineError::InvalidConfiguration(_) => ExitCode::Config,
            PipelineError::TransientExhausted(_) => ExitCode::TempFail,
            PipelineError::TransportErrorPermanent(_) => ExitCode::Protocol,
            PipelineError::TransportErrorTransient(_) => ExitCode::Unavailable,
            PipelineError::Cancelled(_) => ExitCode::Interrupted,
            PipelineError::KillSwitchTriggered(_) => ExitCode::TempFail,
            PipelineError::TransientStepError(_) | PipelineError::PermanentStepError(_) => ExitCode::Error,
            PipelineError::InternalError(_) => ExitCode::Software,
        }
    }

    /// Create ExitCode from a generic error, used for bootstrap-phase
    /// failures (CLI parsing, manifest I/O) that predate a `PipelineError`.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        let error_string = error.to_string().to_lowercase();

        if error_string.contains("not found") || error_string.contains("no such") {
            ExitCode::NoInput
        } else if error_string.contains("invalid") || error_string.contains("argument") {
            ExitCode::UsageError
        } else if error_string.contains("parse") || error_string.contains("format") || error_string.contains("yaml") {
            ExitCode::DataError
        } else if error_string.contains("config") {
            ExitCode::Config
        } else {
            ExitCode::Error
        }
    }

    /// Get human-readable description of exit code
    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::Error => "General error",
            ExitCode::UsageError => "Command line usage error",
            ExitCode::DataError => "Data format error",
            ExitCode::NoInput => "Cannot open input",
            ExitCode::Unavailable => "Service unavailable",
            ExitCode::Software => "Internal software error",
            ExitCode::TempFail => "Temporary failure, retry",
            ExitCode::Protocol => "Remote error in protocol",
            ExitCode::Config => "Configuration error",
            ExitCode::Interrupted => "Interrupted by signal (SIGINT)",
            ExitCode::Terminated => "Terminated by signal (SIGTERM)",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn is_error(self) -> bool {
        !self.is_success()
    }

    pub fn is_signal(self) -> bool {
        matches!(self, ExitCode::Interrupted | ExitCode::Terminated)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

/// Map a `Result<T, PipelineError>` to a process exit code, logging the
/// error cause chain on failure.
pub fn result_to_exit_code<T>(result: Result<T, PipelineError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "run terminated");
            ExitCode::from_pipeline_error(&e)
        }
    }
}

pub fn map_error_to_exit_code(error: &PipelineError) -> ExitCode {
    ExitCode::from_pipeline_error(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Error.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 64);
        assert_eq!(ExitCode::Config.as_i32(), 78);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
        assert_eq!(ExitCode::Terminated.as_i32(), 143);
    }

    #[test]
    fn policy_violation_maps_to_config_error() {
        let err = PipelineError::PolicyViolation("require-cache miss".into());
        assert_eq!(ExitCode::from_pipeline_error(&err), ExitCode::Config);
    }

    #[test]
    fn transient_exhausted_maps_to_temp_fail() {
        let err = PipelineError::TransientExhausted("3 attempts".into());
        assert_eq!(ExitCode::from_pipeline_error(&err), ExitCode::TempFail);
    }

    #[test]
    fn kill_switch_maps_to_temp_fail() {
        let err = PipelineError::KillSwitchTriggered("retry_amplification".into());
        assert_eq!(ExitCode::from_pipeline_error(&err), ExitCode::TempFail);
    }

    #[test]
    fn cancelled_maps_to_interrupted() {
        let err = PipelineError::Cancelled("upstream".into());
        assert_eq!(ExitCode::from_pipeline_error(&err), ExitCode::Interrupted);
    }

    #[test]
    fn result_to_exit_code_success() {
        let result: Result<(), PipelineError> = Ok(());
        assert_eq!(result_to_exit_code(result), ExitCode::Success);
    }

    #[test]
    fn result_to_exit_code_failure() {
        let result: Result<(), PipelineError> = Err(PipelineError::InternalError("bug".into()));
        assert_eq!(result_to_exit_code(result), ExitCode::Software);
    }

    #[test]
    fn test_display() {
        let code = ExitCode::UsageError;
        let display = format!("{}", code);
        assert!(display.contains("Command line usage error"));
        assert!(display.contains("64"));
    }

    #[test]
    fn test_conversion_to_i32() {
        let code: i32 = ExitCode::Config.into();
        assert_eq!(code, 78);
    }
}
