// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Local transport bridge : direct in-process call into a step's
//! registered operator, used in `monolith` runtime layout. No wire framing
//! applies — the envelope already is the step's domain representation.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use pipeline_domain::{Envelope, EnvelopeStream, InvocationContext, PipelineError, StepName, TransportBridge};

/// The in-process operator a step delegates to ("optional delegate
/// reference (external operator)"). One operator implements whichever of
/// the four call shapes its step's cardinality actually uses; the others
/// default to `PermanentStepError` so a misconfigured manifest fails fast
/// rather than silently no-op'ing.
#[async_trait]
pub trait StepOperator: Send + Sync {
    async fn call_unary_unary(&self, _input: Envelope, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
        Err(unsupported("unary-unary"))
    }

    async fn call_unary_many(&self, _input: Envelope, _ctx: &InvocationContext) -> Result<EnvelopeStream, PipelineError> {
        Err(unsupported("unary-many"))
    }

    async fn call_many_unary(&self, _inputs: Vec<Envelope>, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
        Err(unsupported("many-unary"))
    }

    async fn call_many_many(&self, _inputs: Vec<Envelope>, _ctx: &InvocationContext) -> Result<EnvelopeStream, PipelineError> {
        Err(unsupported("many-many"))
    }
}

fn unsupported(shape: &str) -> PipelineError {
    PipelineError::PermanentStepError(format!("operator does not implement the {shape} call shape"))
}

/// Registry of operators keyed by step name, plus the `LocalTransportBridge`
/// that dispatches to them: an explicit registry constructed at startup
/// from the manifest, rather than runtime reflection.
#[derive(Clone, Default)]
pub struct LocalTransportBridge {
    operators: Arc<DashMap<String, Arc<dyn StepOperator>>>,
}

impl LocalTransportBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, step: &StepName, operator: Arc<dyn StepOperator>) {
        self.operators.insert(step.as_str().to_string(), operator);
    }

    fn lookup(&self, step: &StepName) -> Result<Arc<dyn StepOperator>, PipelineError> {
        self.operators
            .get(step.as_str())
            .map(|entry| entry.clone())
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("no local operator registered for step '{step}'")))
    }
}

#[async_trait]
impl TransportBridge for LocalTransportBridge {
    async fn invoke_unary_unary(
        &self,
        step: &StepName,
        request: Envelope,
        context: &InvocationContext,
    ) -> Result<Envelope, PipelineError> {
        self.lookup(step)?.call_unary_unary(request, context).await
    }

    async fn invoke_unary_many(
        &self,
        step: &StepName,
        request: Envelope,
        context: &InvocationContext,
    ) -> Result<EnvelopeStream, PipelineError> {
        self.lookup(step)?.call_unary_many(request, context).await
    }

    async fn invoke_many_unary(
        &self,
        step: &StepName,
        requests: EnvelopeStream,
        context: &InvocationContext,
    ) -> Result<Envelope, PipelineError> {
        let items: Vec<Envelope> = requests.collect::<Vec<_>>().await.into_iter().collect::<Result<_, _>>()?;
        self.lookup(step)?.call_many_unary(items, context).await
    }

    async fn invoke_many_many(
        &self,
        step: &StepName,
        requests: EnvelopeStream,
        context: &InvocationContext,
    ) -> Result<EnvelopeStream, PipelineError> {
        let items: Vec<Envelope> = requests.collect::<Vec<_>>().await.into_iter().collect::<Result<_, _>>()?;
        self.lookup(step)?.call_many_many(items, context).await
    }

    async fn cancel(&self, _step: &StepName) -> Result<(), PipelineError> {
        // Local calls run synchronously to completion within this task;
        // there is nothing in-flight to signal beyond letting the Runner's
        // own cancellation token stop admitting further items.
        Ok(())
    }
}

/// Convenience wrapper turning a plain async closure into a `StepOperator`
/// for the common 1→1 case, used heavily by the demonstration pipeline and
/// by tests.
pub struct UnaryFn<F>(pub F);

#[async_trait]
impl<F, Fut> StepOperator for UnaryFn<F>
where
    F: Fn(Envelope, InvocationContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Envelope, PipelineError>> + Send,
{
    async fn call_unary_unary(&self, input: Envelope, ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
        (self.0)(input, ctx.clone()).await
    }
}

/// Convenience wrapper for 1→N operators expressed as a function returning
/// a `Vec`, boxed into a stream.
pub struct ExpandFn<F>(pub F);

#[async_trait]
impl<F, Fut> StepOperator for ExpandFn<F>
where
    F: Fn(Envelope, InvocationContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Vec<Envelope>, PipelineError>> + Send,
{
    async fn call_unary_many(&self, input: Envelope, ctx: &InvocationContext) -> Result<EnvelopeStream, PipelineError> {
        let items = (self.0)(input, ctx.clone()).await?;
        Ok(stream::iter(items.into_iter().map(Ok)).boxed())
    }
}

/// Convenience wrapper for N→1 reduction operators.
pub struct ReduceFn<F>(pub F);

#[async_trait]
impl<F, Fut> StepOperator for ReduceFn<F>
where
    F: Fn(Vec<Envelope>, InvocationContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Envelope, PipelineError>> + Send,
{
    async fn call_many_unary(&self, inputs: Vec<Envelope>, ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
        (self.0)(inputs, ctx.clone()).await
    }
}
