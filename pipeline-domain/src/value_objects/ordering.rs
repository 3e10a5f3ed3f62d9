// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Per-step ordering requirement and thread-safety declaration.

use serde::{Deserialize, Serialize};

/// Whether a step's concurrent invocations must preserve input order in
/// their emissions, or may complete (and thus emit) out of order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub enum OrderingRequirement {
    /// Downstream must observe completion in the order items entered the step.
    Strict,
    /// Emission order is the completion order; no ordering guarantee.
    #[default]
    Relaxed,
}

/// Whether a step's underlying implementation tolerates concurrent
/// invocation. An `Unsafe` step is always executed with effective
/// concurrency 1.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub enum ThreadSafety {
    #[default]
    Safe,
    Unsafe,
}

impl ThreadSafety {
    /// The concurrency window this declaration permits, given the step's
    /// configured window.
    pub fn effective_concurrency(&self, configured: usize) -> usize {
        match self {
            Self::Safe => configured,
            Self::Unsafe => 1,
        }
    }
}
