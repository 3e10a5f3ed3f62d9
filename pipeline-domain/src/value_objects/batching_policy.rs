// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Bounded backpressure window (concurrency model).

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// The bounded concurrency window a step is invoked under. Combined with a
/// step's `ThreadSafety` declaration to produce effective concurrency.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BatchingPolicy {
    window: usize,
}

impl BatchingPolicy {
    pub fn new(window: usize) -> Result<Self, PipelineError> {
        if window == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "concurrency window must be at least 1".into(),
            ));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for BatchingPolicy {
    fn default() -> Self {
        // A bounded concurrency window, default 128, configurable per step.
        // The same value object doubles as the N->1 batch-size bound; both
        // read the same default sensibly.
        Self { window: 128 }
    }
}
