// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Idempotency policy: how C10 derives the dedupe key for its bounded
//! parking lot.

use serde::{Deserialize, Serialize};

use crate::value_objects::CorrelationKey;

/// Where a retry/dedupe key comes from.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum IdempotencyPolicy {
    /// Derive the key from the invocation context's own stable identity
    /// (run id + step name + correlation key, when present).
    ContextStable,
    /// Use a key explicitly supplied by the step declaration.
    Explicit(String),
}

impl IdempotencyPolicy {
    pub fn resolve_key(&self, run_id: &str, step_name: &str, correlation: Option<&CorrelationKey>) -> String {
        match self {
            Self::ContextStable => match correlation {
                Some(c) => format!("{run_id}:{step_name}:{}", c.as_str()),
                None => format!("{run_id}:{step_name}"),
            },
            Self::Explicit(key) => key.clone(),
        }
    }
}

impl Default for IdempotencyPolicy {
    fn default() -> Self {
        Self::ContextStable
    }
}
