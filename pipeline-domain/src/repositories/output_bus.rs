// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `OutputBus` port: publishes terminal emissions and run events to
//! cross-pipeline bridges (C9).

use async_trait::async_trait;

use crate::events::RunEvent;
use crate::PipelineError;

#[async_trait]
pub trait OutputBus: Send + Sync {
    async fn publish_emission(&self, step_name: &str, payload: serde_json::Value) -> Result<(), PipelineError>;

    async fn publish_event(&self, event: RunEvent) -> Result<(), PipelineError>;
}
