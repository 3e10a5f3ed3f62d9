// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Function transport bridge : request/response invocation with
//! optional batching for streaming shapes, governed by a `BatchingPolicy`
//! and an `IdempotencyPolicy` per step (`tpf.*` configuration keys).

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

use pipeline_domain::{
    BatchingPolicy, Envelope, EnvelopeStream, IdempotencyPolicy, InvocationContext, PipelineError, StepName,
    TransportBridge,
};

/// A registered function target: the handler a `tpf.function.target.*`
/// configuration entry would resolve to. Takes the resolved idempotency key
/// alongside the request so implementations can dedupe on their own side
/// (e.g. an at-least-once FaaS platform).
#[async_trait]
pub trait StepFunction: Send + Sync {
    async fn invoke(&self, request: Envelope, idempotency_key: &str, ctx: &InvocationContext) -> Result<Envelope, PipelineError>;
}

/// Behavior when a step's `maxInFlight` bound is saturated.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OverflowPolicy {
    /// Wait for a slot to free up.
    Buffer,
    /// Evict the oldest still-queued admission request rather than the
    /// caller's own; modeled here as a retriable rejection so the caller's
    /// own retry policy (C10) backs off, since the bridge has no way to
    /// force-cancel an in-flight remote call it has already admitted.
    DropOldest,
    /// Reject immediately.
    Fail,
}

struct Gate {
    semaphore: Semaphore,
    overflow: OverflowPolicy,
}

impl Gate {
    fn new(max_in_flight: usize, overflow: OverflowPolicy) -> Self {
        Self {
            semaphore: Semaphore::new(max_in_flight.max(1)),
            overflow,
        }
    }

    async fn admit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, PipelineError> {
        match self.overflow {
            OverflowPolicy::Buffer => Ok(self.semaphore.acquire().await.expect("gate semaphore never closed")),
            OverflowPolicy::Fail => self
                .semaphore
                .try_acquire()
                .map_err(|_| PipelineError::TransportErrorPermanent("function invocation queue is full".into())),
            OverflowPolicy::DropOldest => self.semaphore.try_acquire().map_err(|_| {
                warn!("function invocation gate saturated, dropping oldest queued request");
                PipelineError::TransientStepError("function invocation queue overflow (drop-oldest)".into())
            }),
        }
    }
}

struct StepConfig {
    function: Arc<dyn StepFunction>,
    batching: BatchingPolicy,
    idempotency: IdempotencyPolicy,
    gate: Arc<Gate>,
}

/// Resolves the retry-stable key a function invocation carries, degrading
/// `Explicit` to `ContextStable` when the configured key is blank (
/// "if missing, a warning is logged and the policy degrades").
fn resolve_idempotency_key(policy: &IdempotencyPolicy, context: &InvocationContext, step_name: &str) -> String {
    match policy {
        IdempotencyPolicy::Explicit(key) if !key.trim().is_empty() => key.clone(),
        IdempotencyPolicy::Explicit(_) => {
            warn!(step = step_name, "explicit idempotency key is blank, degrading to context-stable");
            IdempotencyPolicy::ContextStable.resolve_key(&context.run_id().as_str(), step_name, context.correlation_key())
        }
        IdempotencyPolicy::ContextStable => {
            IdempotencyPolicy::ContextStable.resolve_key(&context.run_id().as_str(), step_name, context.correlation_key())
        }
    }
}

#[derive(Clone, Default)]
pub struct FunctionTransportBridge {
    steps: Arc<DashMap<String, StepConfig>>,
}

impl FunctionTransportBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        step: &StepName,
        function: Arc<dyn StepFunction>,
        batching: BatchingPolicy,
        idempotency: IdempotencyPolicy,
        max_in_flight: usize,
        overflow: OverflowPolicy,
    ) {
        self.steps.insert(
            step.as_str().to_string(),
            StepConfig {
                function,
                batching,
                idempotency,
                gate: Arc::new(Gate::new(max_in_flight, overflow)),
            },
        );
    }

    fn config(&self, step: &StepName) -> Result<Arc<dyn StepFunction>, PipelineError> {
        self.steps
            .get(step.as_str())
            .map(|c| c.function.clone())
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("no function target registered for step '{step}'")))
    }

    async fn call_one(&self, step: &StepName, request: Envelope, ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
        let entry = self
            .steps
            .get(step.as_str())
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("no function target registered for step '{step}'")))?;
        let gate = entry.gate.clone();
        let function = entry.function.clone();
        let key = resolve_idempotency_key(&entry.idempotency, ctx, step.as_str());
        drop(entry);

        let _permit = gate.admit().await?;
        function.invoke(request, &key, ctx).await
    }

    /// Chunks `items` per the step's configured `maxItems` bound (`maxBytes`
    /// is not modeled: the envelope is treated as opaque payload bytes
    /// over the wire, not a size this bridge inspects).
    fn chunk(&self, step: &StepName, items: Vec<Envelope>) -> Vec<Vec<Envelope>> {
        let max_items = self.steps.get(step.as_str()).map(|c| c.batching.window()).unwrap_or(1).max(1);
        items.chunks(max_items).map(|c| c.to_vec()).collect()
    }
}

#[async_trait]
impl TransportBridge for FunctionTransportBridge {
    async fn invoke_unary_unary(
        &self,
        step: &StepName,
        request: Envelope,
        context: &InvocationContext,
    ) -> Result<Envelope, PipelineError> {
        self.call_one(step, request, context).await
    }

    async fn invoke_unary_many(
        &self,
        step: &StepName,
        request: Envelope,
        context: &InvocationContext,
    ) -> Result<EnvelopeStream, PipelineError> {
        let response = self.call_one(step, request, context).await?;
        let items = match response {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };
        Ok(stream::iter(items.into_iter().map(Ok)).boxed())
    }

    async fn invoke_many_unary(
        &self,
        step: &StepName,
        requests: EnvelopeStream,
        context: &InvocationContext,
    ) -> Result<Envelope, PipelineError> {
        let items: Vec<Envelope> = requests.collect::<Vec<_>>().await.into_iter().collect::<Result<_, _>>()?;
        let chunks = self.chunk(step, items);
        let function = self.config(step)?;
        let entry = self
            .steps
            .get(step.as_str())
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("no function target registered for step '{step}'")))?;
        let gate = entry.gate.clone();
        let key = resolve_idempotency_key(&entry.idempotency, context, step.as_str());
        drop(entry);

        let mut partials = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let _permit = gate.admit().await?;
            let batched_request = serde_json::Value::Array(chunk);
            partials.push(function.invoke(batched_request, &key, context).await?);
        }

        // A single chunk is already the aggregated result; multiple chunks
        // (batch exceeded maxItems) are folded into one array so the
        // reduction still produces exactly one item, per the N→1
        // cardinality invariant.
        match partials.len() {
            0 => Err(PipelineError::ValidationError("many-to-one batch was empty".into())),
            1 => Ok(partials.into_iter().next().unwrap()),
            _ => Ok(serde_json::Value::Array(partials)),
        }
    }

    async fn invoke_many_many(
        &self,
        step: &StepName,
        requests: EnvelopeStream,
        context: &InvocationContext,
    ) -> Result<EnvelopeStream, PipelineError> {
        let items: Vec<Envelope> = requests.collect::<Vec<_>>().await.into_iter().collect::<Result<_, _>>()?;
        let chunks = self.chunk(step, items);
        let function = self.config(step)?;
        let entry = self
            .steps
            .get(step.as_str())
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("no function target registered for step '{step}'")))?;
        let gate = entry.gate.clone();
        let key = resolve_idempotency_key(&entry.idempotency, context, step.as_str());
        drop(entry);

        let mut outputs = Vec::new();
        for chunk in chunks {
            let _permit = gate.admit().await?;
            let batched_request = serde_json::Value::Array(chunk);
            let response = function.invoke(batched_request, &key, context).await?;
            match response {
                serde_json::Value::Array(items) => outputs.extend(items),
                other => outputs.push(other),
            }
        }
        Ok(stream::iter(outputs.into_iter().map(Ok)).boxed())
    }

    async fn cancel(&self, _step: &StepName) -> Result<(), PipelineError> {
        // Function invocations are request/response; there is no
        // outstanding stream to signal beyond letting in-flight calls drain.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::{ReplayMode, RunId, VersionTag};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoFunction;

    #[async_trait]
    impl StepFunction for EchoFunction {
        async fn invoke(&self, request: Envelope, _key: &str, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
            Ok(request)
        }
    }

    struct KeyCapturingFunction(Arc<std::sync::Mutex<Vec<String>>>);

    #[async_trait]
    impl StepFunction for KeyCapturingFunction {
        async fn invoke(&self, request: Envelope, key: &str, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
            self.0.lock().unwrap().push(key.to_string());
            Ok(request)
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext::new(RunId::new(), VersionTag::none(), ReplayMode::Off)
    }

    #[tokio::test]
    async fn unary_unary_invokes_the_registered_function() {
        let bridge = FunctionTransportBridge::new();
        let step = StepName::new("resize").unwrap();
        bridge.register(
            &step,
            Arc::new(EchoFunction),
            BatchingPolicy::default(),
            IdempotencyPolicy::ContextStable,
            4,
            OverflowPolicy::Buffer,
        );

        let result = bridge.invoke_unary_unary(&step, serde_json::json!(1), &ctx()).await.unwrap();
        assert_eq!(result, serde_json::json!(1));
    }

    #[tokio::test]
    async fn blank_explicit_key_degrades_to_context_stable_with_a_warning() {
        let captured = Arc::new(std::sync::Mutex::new(Vec::new()));
        let bridge = FunctionTransportBridge::new();
        let step = StepName::new("target").unwrap();
        bridge.register(
            &step,
            Arc::new(KeyCapturingFunction(captured.clone())),
            BatchingPolicy::default(),
            IdempotencyPolicy::Explicit(String::new()),
            4,
            OverflowPolicy::Buffer,
        );

        let context = ctx();
        bridge.invoke_unary_unary(&step, serde_json::json!(1), &context).await.unwrap();
        bridge.invoke_unary_unary(&step, serde_json::json!(2), &context).await.unwrap();

        let keys = captured.lock().unwrap();
        assert_eq!(keys.len(), 2);
        // Reused across calls sharing the same context: "idempotency reuse".
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn explicit_key_is_honored_when_non_blank() {
        let captured = Arc::new(std::sync::Mutex::new(Vec::new()));
        let bridge = FunctionTransportBridge::new();
        let step = StepName::new("target").unwrap();
        bridge.register(
            &step,
            Arc::new(KeyCapturingFunction(captured.clone())),
            BatchingPolicy::default(),
            IdempotencyPolicy::Explicit("fixed-key".into()),
            4,
            OverflowPolicy::Buffer,
        );

        bridge.invoke_unary_unary(&step, serde_json::json!(1), &ctx()).await.unwrap();
        assert_eq!(captured.lock().unwrap()[0], "fixed-key");
    }

    #[tokio::test]
    async fn fail_overflow_rejects_once_max_in_flight_is_saturated() {
        let step = StepName::new("saturating").unwrap();

        // Hold the single permit open across an await point by calling a
        // slow function, then attempt a second concurrent call.
        struct SlowFunction(Arc<AtomicUsize>);
        #[async_trait]
        impl StepFunction for SlowFunction {
            async fn invoke(&self, request: Envelope, _key: &str, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(request)
            }
        }
        let counter = Arc::new(AtomicUsize::new(0));
        let bridge = FunctionTransportBridge::new();
        bridge.register(
            &step,
            Arc::new(SlowFunction(counter)),
            BatchingPolicy::default(),
            IdempotencyPolicy::ContextStable,
            1,
            OverflowPolicy::Fail,
        );

        let held = bridge.clone();
        let held_step = step.clone();
        let handle = tokio::spawn(async move { held.invoke_unary_unary(&held_step, serde_json::json!(1), &ctx()).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = bridge.invoke_unary_unary(&step, serde_json::json!(2), &ctx()).await;
        assert!(matches!(second, Err(PipelineError::TransportErrorPermanent(_))));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn many_unary_splits_oversized_batches_into_multiple_chunk_invocations() {
        let call_count = Arc::new(AtomicUsize::new(0));
        struct CountingFunction(Arc<AtomicUsize>);
        #[async_trait]
        impl StepFunction for CountingFunction {
            async fn invoke(&self, request: Envelope, _key: &str, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(request)
            }
        }

        let bridge = FunctionTransportBridge::new();
        let step = StepName::new("batch-reduce").unwrap();
        bridge.register(
            &step,
            Arc::new(CountingFunction(call_count.clone())),
            BatchingPolicy::new(2).unwrap(),
            IdempotencyPolicy::ContextStable,
            4,
            OverflowPolicy::Buffer,
        );

        let items: EnvelopeStream = stream::iter((0..5).map(|i| Ok(serde_json::json!(i)))).boxed();
        let result = bridge.invoke_many_unary(&step, items, &ctx()).await.unwrap();
        // 5 items chunked by maxItems=2 -> 3 function invocations, folded
        // into one aggregated array since it took more than one chunk.
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert!(result.is_array());
    }
}
