// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `TransportBridge` port: one interface per cardinality shape, mapping
//! each to an underlying local call, RPC stream, or batched function
//! invocation (C4).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::entities::InvocationContext;
use crate::value_objects::StepName;
use crate::PipelineError;

pub type Envelope = serde_json::Value;
pub type EnvelopeStream = BoxStream<'static, Result<Envelope, PipelineError>>;

/// Transport-transparent step invocation. Implementations propagate the
/// closed set of context headers (version, replay, cache-policy) across
/// every hop; round-trip preservation is a testable property.
#[async_trait]
pub trait TransportBridge: Send + Sync {
    async fn invoke_unary_unary(
        &self,
        step: &StepName,
        request: Envelope,
        context: &InvocationContext,
    ) -> Result<Envelope, PipelineError>;

    async fn invoke_unary_many(
        &self,
        step: &StepName,
        request: Envelope,
        context: &InvocationContext,
    ) -> Result<EnvelopeStream, PipelineError>;

    async fn invoke_many_unary(
        &self,
        step: &StepName,
        requests: EnvelopeStream,
        context: &InvocationContext,
    ) -> Result<Envelope, PipelineError>;

    async fn invoke_many_many(
        &self,
        step: &StepName,
        requests: EnvelopeStream,
        context: &InvocationContext,
    ) -> Result<EnvelopeStream, PipelineError>;

    /// Signals cooperative cancellation to any in-flight call this bridge
    /// is servicing for `step`; does not force-abort outstanding remote
    /// calls.
    async fn cancel(&self, step: &StepName) -> Result<(), PipelineError>;
}
