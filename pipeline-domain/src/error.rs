// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Taxonomy
//!
//! `PipelineError` is the single error type crossing every domain and port
//! boundary. Each variant corresponds to one of the runtime's error
//! categories: validation, transport, policy, step-declared retriability,
//! cancellation, and the kill-switch.
//!
//! Only `TransientStepError` and a transient `TransportError` are locally
//! recoverable (retried with backoff by C10); everything else surfaces to
//! the `Runner` and terminates the run.

use thiserror::Error;

/// Domain-specific errors for the pipeline runtime.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Bad input at a mapper boundary (e.g. a missing required id).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Transient transport failure: timeout, connection reset. Retriable.
    #[error("transient transport error: {0}")]
    TransportErrorTransient(String),

    /// Permanent transport failure: malformed frame, unsupported cardinality.
    #[error("transport error: {0}")]
    TransportErrorPermanent(String),

    /// `require-cache` miss, mixed correlation keys in an N→1 batch, or an
    /// `unsafe` step invoked concurrently.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Declared retriable by the step. Bounded retries apply.
    #[error("transient step error: {0}")]
    TransientStepError(String),

    /// Retries of a `TransientStepError` were exhausted.
    #[error("transient error exhausted after retries: {0}")]
    TransientExhausted(String),

    /// Declared non-retriable by the step.
    #[error("permanent step error: {0}")]
    PermanentStepError(String),

    /// Cooperative cancellation propagated from the `Runner`.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The in-flight probe fired in fail-fast mode.
    #[error("kill switch triggered: {0}")]
    KillSwitchTriggered(String),

    /// A mapper raised on a non-null but invalid payload.
    #[error("mapping error: {0}")]
    MappingError(String),

    /// Malformed or missing configuration / pipeline manifest.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Catch-all for conditions that should be unreachable.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// Whether the error is locally recoverable by C10's retry policy.
    ///
    /// Local recovery applies only to `TransientStepError` and a
    /// transient `TransportError`.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientStepError(_) | PipelineError::TransportErrorTransient(_)
        )
    }

    /// Whether the error terminates the run outright (everything else).
    pub fn is_terminal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Short machine-readable error kind, used on the terminal `PipelineError`
    /// the `Runner` surfaces to callers to pick an exit code.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ValidationError(_) => "ValidationError",
            PipelineError::TransportErrorTransient(_) | PipelineError::TransportErrorPermanent(_) => {
                "TransportError"
            }
            PipelineError::PolicyViolation(_) => "PolicyViolation",
            PipelineError::TransientStepError(_) => "TransientStepError",
            PipelineError::TransientExhausted(_) => "Transient-Exhausted",
            PipelineError::PermanentStepError(_) => "PermanentStepError",
            PipelineError::Cancelled(_) => "Cancelled",
            PipelineError::KillSwitchTriggered(_) => "KillSwitchTriggered",
            PipelineError::MappingError(_) => "MappingError",
            PipelineError::InvalidConfiguration(_) => "InvalidConfiguration",
            PipelineError::InternalError(_) => "InternalError",
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::MappingError(err.to_string())
    }
}
