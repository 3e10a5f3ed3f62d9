// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain events raised by a pipeline run, for event-sourced state
//! reconstruction and external observability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::RunId;

/// A significant state transition in a pipeline run's lifecycle.
///
/// Mirrors the aggregate's own state machine: one run produces exactly one
/// `RunStarted`, zero or more `StepCompleted`/`StepFailed`, and exactly one
/// terminal event (`RunCompleted`, `RunFailed`, or `RunKilled`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        pipeline_name: String,
        occurred_at: DateTime<Utc>,
    },
    StepCompleted {
        run_id: RunId,
        step_name: String,
        cache_hit: bool,
        occurred_at: DateTime<Utc>,
    },
    StepFailed {
        run_id: RunId,
        step_name: String,
        error_kind: String,
        occurred_at: DateTime<Utc>,
    },
    RunCompleted {
        run_id: RunId,
        occurred_at: DateTime<Utc>,
    },
    RunFailed {
        run_id: RunId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    RunKilled {
        run_id: RunId,
        in_flight_at_trigger: usize,
        occurred_at: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::RunKilled { run_id, .. } => run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunFailed { .. } | Self::RunKilled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_three_outcome_variants_are_terminal() {
        let run_id = RunId::new();
        let now = Utc::now();
        assert!(!RunEvent::RunStarted {
            run_id: run_id.clone(),
            pipeline_name: "p".into(),
            occurred_at: now
        }
        .is_terminal());
        assert!(RunEvent::RunCompleted {
            run_id,
            occurred_at: now
        }
        .is_terminal());
    }
}
