// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Pipeline run aggregate: the consistency boundary for one execution of a
//! `PipelineDescriptor`, accumulating `RunEvent`s as the `Runner` (C6)
//! drives it through its steps.

use chrono::Utc;

use crate::events::RunEvent;
use crate::value_objects::RunId;
use crate::PipelineError;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

/// Tracks one run's lifecycle and the events it has raised but not yet
/// published to the output bus.
#[derive(Debug, Clone)]
pub struct PipelineRunAggregate {
    run_id: RunId,
    pipeline_name: String,
    status: RunStatus,
    steps_completed: usize,
    uncommitted_events: Vec<RunEvent>,
}

impl PipelineRunAggregate {
    pub fn start(run_id: RunId, pipeline_name: impl Into<String>) -> Self {
        let pipeline_name = pipeline_name.into();
        let mut aggregate = Self {
            run_id: run_id.clone(),
            pipeline_name: pipeline_name.clone(),
            status: RunStatus::Running,
            steps_completed: 0,
            uncommitted_events: Vec::new(),
        };
        aggregate.raise(RunEvent::RunStarted {
            run_id,
            pipeline_name,
            occurred_at: Utc::now(),
        });
        aggregate
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn steps_completed(&self) -> usize {
        self.steps_completed
    }

    pub fn record_step_completed(&mut self, step_name: impl Into<String>, cache_hit: bool) -> Result<(), PipelineError> {
        self.require_running()?;
        self.steps_completed += 1;
        self.raise(RunEvent::StepCompleted {
            run_id: self.run_id.clone(),
            step_name: step_name.into(),
            cache_hit,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    pub fn record_step_failed(&mut self, step_name: impl Into<String>, error_kind: impl Into<String>) -> Result<(), PipelineError> {
        self.require_running()?;
        self.raise(RunEvent::StepFailed {
            run_id: self.run_id.clone(),
            step_name: step_name.into(),
            error_kind: error_kind.into(),
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), PipelineError> {
        self.require_running()?;
        self.status = RunStatus::Completed;
        self.raise(RunEvent::RunCompleted {
            run_id: self.run_id.clone(),
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PipelineError> {
        self.require_running()?;
        self.status = RunStatus::Failed;
        self.raise(RunEvent::RunFailed {
            run_id: self.run_id.clone(),
            reason: reason.into(),
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    pub fn kill(&mut self, in_flight_at_trigger: usize) -> Result<(), PipelineError> {
        self.require_running()?;
        self.status = RunStatus::Killed;
        self.raise(RunEvent::RunKilled {
            run_id: self.run_id.clone(),
            in_flight_at_trigger,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Drains events accumulated since the last drain, for the output bus
    /// (C9) to publish.
    pub fn drain_events(&mut self) -> Vec<RunEvent> {
        std::mem::take(&mut self.uncommitted_events)
    }

    fn raise(&mut self, event: RunEvent) {
        self.uncommitted_events.push(event);
    }

    fn require_running(&self) -> Result<(), PipelineError> {
        if self.status != RunStatus::Running {
            return Err(PipelineError::InvalidConfiguration(format!(
                "run {} is no longer in progress (status: {:?})",
                self.run_id, self.status
            )));
        }
        Ok(())
    }
}
