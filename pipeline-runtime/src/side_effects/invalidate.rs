// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cache-invalidation side effect: evicts the primary step's cache entry,
//! but only while replaying live.

use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::{CacheKey, InvocationContext, PipelineError, SideEffectHook};

use crate::cache::{CacheWriterPool, KeyArbitrator};
use crate::side_effects::SideEffectKind;

/// Resolves the same key the primary step's cache write used and evicts it
/// from every registered writer, so a subsequent `prefer-cache` read misses
/// and the step re-runs. Applies only when `context.replay_mode()` is
/// `Live` (open question: the replay header otherwise gates
/// nothing else in the core).
pub struct InvalidateSideEffect {
    hook_name: String,
    type_name: String,
    arbitrator: Arc<KeyArbitrator>,
    writers: Arc<CacheWriterPool>,
}

impl InvalidateSideEffect {
    pub fn new(after_step: impl Into<String>, type_name: impl Into<String>, arbitrator: Arc<KeyArbitrator>, writers: Arc<CacheWriterPool>) -> Self {
        let after_step = after_step.into();
        Self {
            hook_name: SideEffectKind::Invalidate.hook_name(&after_step),
            type_name: type_name.into(),
            arbitrator,
            writers,
        }
    }
}

#[async_trait]
impl SideEffectHook for InvalidateSideEffect {
    fn name(&self) -> &str {
        &self.hook_name
    }

    fn applies(&self, context: &InvocationContext) -> bool {
        context.replay_mode().allows_invalidation()
    }

    async fn apply(&self, value: &serde_json::Value, context: &InvocationContext) -> Result<(), PipelineError> {
        if let Some(key) = self
            .arbitrator
            .resolve_namespaced(value, context, &self.type_name, context.version_tag())?
        {
            self.writers.invalidate_best_effort(CacheKey::from_resolved(key));
        }
        Ok(())
    }
}
