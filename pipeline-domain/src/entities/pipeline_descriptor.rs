// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Pipeline descriptor entity: the ordered sequence of step descriptors
//! that make up one pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::StepDescriptor;
use crate::value_objects::{ReplayMode, VersionTag};
use crate::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    name: String,
    steps: Vec<StepDescriptor>,
    version_tag: VersionTag,
    replay_mode: ReplayMode,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PipelineDescriptor {
    pub fn new(
        name: impl Into<String>,
        steps: Vec<StepDescriptor>,
        version_tag: VersionTag,
        replay_mode: ReplayMode,
    ) -> Result<Self, PipelineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::ValidationError("pipeline name must not be blank".into()));
        }
        if steps.is_empty() {
            return Err(PipelineError::ValidationError(
                "pipeline must declare at least one step".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for step in &steps {
            if !seen.insert(step.name().as_str().to_string()) {
                return Err(PipelineError::ValidationError(format!(
                    "duplicate step name '{}' in pipeline",
                    step.name()
                )));
            }
        }

        let now = Utc::now();
        Ok(Self {
            name,
            steps,
            version_tag,
            replay_mode,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn version_tag(&self) -> &VersionTag {
        &self.version_tag
    }

    pub fn replay_mode(&self) -> ReplayMode {
        self.replay_mode
    }

    pub fn step(&self, name: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.name().as_str() == name)
    }
}
