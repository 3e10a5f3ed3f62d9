// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Runner (C6): drives one pipeline run from an input carrier to a
//! terminal emission. Owns the per-run context and the global in-flight
//! counter, selects an invocation strategy from the incoming carrier shape
//! (unary vs. stream) and the step's declared cardinality, and interleaves
//! side-effect hooks into the effective step order produced by the
//! expander (C7).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::warn;

use pipeline_domain::{
    Carrier, CardinalityShape, CorrelationKey, Envelope, EnvelopeStream, InvocationContext, OrderingRequirement,
    OutputBus, PipelineDescriptor, PipelineError, PipelineRunAggregate, SideEffectHook, StepDescriptor,
};

use crate::invoker::StepInvoker;
use crate::probe::InFlightProbe;
use crate::retry::{execute_with_retry, execute_with_retry_generic, ParkedItem, ParkingLot};
use crate::side_effects::SideEffectSpec;

/// Arc-bundled dependencies shared by the sequential invocation path and the
/// stream-processing closures, which must be `'static` to live inside a
/// boxed stream.
#[derive(Clone)]
struct Handles {
    invoker: Arc<StepInvoker>,
    parking_lot: Arc<ParkingLot>,
    probe: Option<Arc<InFlightProbe>>,
    in_flight: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl Handles {
    /// Admits one item: checks cancellation, bumps the global in-flight
    /// counter, and samples the probe. A probe trip flips `cancelled` so
    /// every subsequent admission in this run fails fast too.
    async fn admit(&self) -> Result<(), PipelineError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled("run cancelled".into()));
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(probe) = &self.probe {
            if let Err(err) = probe.sample(current) {
                self.cancelled.store(true, Ordering::SeqCst);
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Err(err);
            }
        }
        Ok(())
    }

    fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Parks a terminally-failed item, unless the error is a control signal
    /// (`Cancelled`, `KillSwitchTriggered`) rather than a content failure.
    fn park(&self, context: &InvocationContext, payload: Envelope, err: &PipelineError) {
        if matches!(err, PipelineError::Cancelled(_) | PipelineError::KillSwitchTriggered(_)) {
            return;
        }
        self.parking_lot
            .park(ParkedItem::new(context.correlation_key().cloned(), err.kind(), payload));
    }
}

fn extract_correlation_key(item: &Envelope) -> Option<CorrelationKey> {
    item.get("correlationKey")
        .or_else(|| item.get("docId"))
        .and_then(|v| v.as_str())
        .map(CorrelationKey::new)
}

async fn call_unary_unary(
    handles: &Handles,
    step: &StepDescriptor,
    type_name: &str,
    request: Envelope,
    context: &InvocationContext,
) -> Result<Envelope, PipelineError> {
    handles.admit().await?;
    let policy = step.retry();
    let result = execute_with_retry(policy, |_attempt| {
        handles.invoker.invoke_unary_unary(step, type_name, request.clone(), context)
    })
    .await;
    handles.release();
    if let Err(err) = &result {
        handles.park(context, request.clone(), err);
    }
    result
}

async fn call_unary_many(
    handles: &Handles,
    step: &StepDescriptor,
    request: Envelope,
    context: &InvocationContext,
) -> Result<EnvelopeStream, PipelineError> {
    handles.admit().await?;
    let policy = step.retry();
    let result = execute_with_retry_generic(policy, |_attempt| {
        handles.invoker.invoke_unary_many(step, request.clone(), context)
    })
    .await;
    handles.release();
    if let Err(err) = &result {
        handles.park(context, request.clone(), err);
    }
    result
}

/// N→1 invocation over a buffered batch (not a live stream), which lets a
/// retry re-issue the exact same request set on every attempt.
async fn call_many_unary_retried(
    handles: &Handles,
    step: &StepDescriptor,
    type_name: &str,
    batch: Vec<Envelope>,
    context: &InvocationContext,
) -> Result<Envelope, PipelineError> {
    handles.admit().await?;
    let policy = step.retry();
    let parked_payload = batch.first().cloned().unwrap_or(serde_json::Value::Null);
    let result = execute_with_retry(policy, |_attempt| {
        let requests: EnvelopeStream = stream::iter(batch.clone().into_iter().map(Ok)).boxed();
        handles.invoker.invoke_many_unary(step, type_name, requests, context)
    })
    .await;
    handles.release();
    if let Err(err) = &result {
        handles.park(context, parked_payload.clone(), err);
    }
    result
}

async fn call_one_many_many(
    handles: &Handles,
    step: &StepDescriptor,
    value: Envelope,
    context: &InvocationContext,
) -> Result<EnvelopeStream, PipelineError> {
    handles.admit().await?;
    let policy = step.retry();
    let result = execute_with_retry_generic(policy, |_attempt| {
        let requests: EnvelopeStream = stream::iter(vec![Ok(value.clone())]).boxed();
        handles.invoker.invoke_many_many(step, requests, context)
    })
    .await;
    handles.release();
    if let Err(err) = &result {
        handles.park(context, value.clone(), err);
    }
    result
}

/// N→N over a genuinely live stream: not retried, since the request stream
/// is consumed once and cannot be replayed without unbounded buffering.
async fn call_many_many_passthrough(
    handles: &Handles,
    step: &StepDescriptor,
    requests: EnvelopeStream,
    context: &InvocationContext,
) -> Result<EnvelopeStream, PipelineError> {
    handles.admit().await?;
    let result = handles.invoker.invoke_many_many(step, requests, context).await;
    handles.release();
    if let Err(err) = &result {
        handles.park(context, serde_json::Value::Null, err);
    }
    result
}

/// stream → 1→1: per-item invocation with a bounded concurrency window,
/// preserving arrival order only when the step declares `strict` (,
///).
fn fan_out_unary_unary(
    handles: Handles,
    step: StepDescriptor,
    type_name: String,
    items: EnvelopeStream,
    context: InvocationContext,
) -> EnvelopeStream {
    let concurrency = step.effective_concurrency().max(1);
    let strict = step.ordering() == OrderingRequirement::Strict;

    let futures = items.map(move |item| {
        let handles = handles.clone();
        let step = step.clone();
        let type_name = type_name.clone();
        let context = context.clone();
        async move {
            match item {
                Ok(value) => call_unary_unary(&handles, &step, &type_name, value, &context).await,
                Err(err) => Err(err),
            }
        }
    });

    if strict {
        futures.buffered(concurrency).boxed()
    } else {
        futures.buffer_unordered(concurrency).boxed()
    }
}

/// stream → 1→N: each incoming item expands into its own sub-stream; the
/// sub-streams are flattened in arrival order of their parent item.
fn fan_out_unary_many(handles: Handles, step: StepDescriptor, items: EnvelopeStream, context: InvocationContext) -> EnvelopeStream {
    try_stream! {
        futures::pin_mut!(items);
        while let Some(item) = items.next().await {
            let value = item?;
            let mut sub = call_unary_many(&handles, &step, value, &context).await?;
            while let Some(out) = sub.next().await {
                yield out?;
            }
        }
    }
    .boxed()
}

/// stream → N→1: collects the stream into batches bounded by the step's
/// batching window, rejecting mixed correlation keys before invocation
/// ("N→1 rejects mixed correlation").
fn batch_many_unary(
    handles: Handles,
    step: StepDescriptor,
    type_name: String,
    items: EnvelopeStream,
    context: InvocationContext,
) -> EnvelopeStream {
    let window = step.batching().window().max(1);
    try_stream! {
        futures::pin_mut!(items);
        let mut chunk: Vec<Envelope> = Vec::with_capacity(window);
        loop {
            match items.next().await {
                Some(item) => {
                    chunk.push(item?);
                    if chunk.len() >= window {
                        let batch = std::mem::take(&mut chunk);
                        let keys: Vec<CorrelationKey> = batch.iter().filter_map(extract_correlation_key).collect();
                        CorrelationKey::require_uniform(keys.iter())?;
                        yield call_many_unary_retried(&handles, &step, &type_name, batch, &context).await?;
                    }
                }
                None => {
                    if !chunk.is_empty() {
                        let keys: Vec<CorrelationKey> = chunk.iter().filter_map(extract_correlation_key).collect();
                        CorrelationKey::require_uniform(keys.iter())?;
                        yield call_many_unary_retried(&handles, &step, &type_name, chunk, &context).await?;
                    }
                    break;
                }
            }
        }
    }
    .boxed()
}

/// Drives one `PipelineDescriptor` from an input carrier to a terminal
/// emission, applying cache pre-read, transport invocation, and side-effect
/// hooks at each effective step in order.
pub struct Runner {
    handles: Handles,
    output_bus: Arc<dyn OutputBus>,
    side_effect_hooks: HashMap<String, Arc<dyn SideEffectHook>>,
    step_type_names: HashMap<String, String>,
}

impl Runner {
    pub fn new(
        invoker: Arc<StepInvoker>,
        output_bus: Arc<dyn OutputBus>,
        side_effect_hooks: Vec<Arc<dyn SideEffectHook>>,
        step_type_names: HashMap<String, String>,
        probe: Option<Arc<InFlightProbe>>,
        parking_lot: Arc<ParkingLot>,
    ) -> Self {
        Self {
            handles: Handles {
                invoker,
                parking_lot,
                probe,
                in_flight: Arc::new(AtomicUsize::new(0)),
                cancelled: Arc::new(AtomicBool::new(false)),
            },
            output_bus,
            side_effect_hooks: side_effect_hooks.into_iter().map(|hook| (hook.name().to_string(), hook)).collect(),
            step_type_names,
        }
    }

    /// Signals cooperative cancellation: no further items are admitted to
    /// any step; items already in flight are allowed to complete.
    pub fn cancel(&self) {
        self.handles.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.handles.cancelled.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.handles.in_flight.load(Ordering::SeqCst)
    }

    pub fn parking_lot(&self) -> &Arc<ParkingLot> {
        &self.handles.parking_lot
    }

    pub fn probe(&self) -> Option<&Arc<InFlightProbe>> {
        self.handles.probe.as_ref()
    }

    #[tracing::instrument(skip_all, fields(run_id = %context.run_id(), pipeline = pipeline.name()))]
    pub async fn run(
        &self,
        pipeline: &PipelineDescriptor,
        aspects: &[SideEffectSpec],
        input: Carrier<Envelope>,
        context: InvocationContext,
    ) -> Result<Carrier<Envelope>, PipelineError> {
        let mut aggregate = PipelineRunAggregate::start(context.run_id().clone(), pipeline.name());
        self.drain_events(&mut aggregate).await;

        let primary_order: Vec<String> = pipeline.steps().iter().map(|s| s.name().as_str().to_string()).collect();
        let effective_order = crate::side_effects::expand_order(&primary_order, aspects);

        let mut carrier = input;
        for name in &effective_order {
            if self.is_cancelled() {
                let _ = aggregate.fail(format!("cancelled before step '{name}'"));
                self.drain_events(&mut aggregate).await;
                return Err(PipelineError::Cancelled(format!("cancelled before step '{name}'")));
            }

            if let Some(hook) = self.side_effect_hooks.get(name).cloned() {
                carrier = self.apply_hook(hook, carrier, &context).await;
                continue;
            }

            let Some(step) = pipeline.step(name) else {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "effective step order references unknown step '{name}'"
                )));
            };

            match self.invoke_step(step, carrier, &context).await {
                Ok(next) => {
                    carrier = next;
                    aggregate.record_step_completed(step.name().as_str(), false)?;
                }
                Err(err) => {
                    aggregate.record_step_failed(step.name().as_str(), err.kind())?;
                    if matches!(err, PipelineError::KillSwitchTriggered(_)) {
                        let _ = aggregate.kill(self.in_flight());
                    } else {
                        let _ = aggregate.fail(err.to_string());
                    }
                    self.drain_events(&mut aggregate).await;
                    return Err(err);
                }
            }
        }

        aggregate.complete()?;
        self.drain_events(&mut aggregate).await;
        Ok(carrier)
    }

    async fn drain_events(&self, aggregate: &mut PipelineRunAggregate) {
        for event in aggregate.drain_events() {
            if let Err(err) = self.output_bus.publish_event(event).await {
                warn!(error = %err, "failed to publish run event");
            }
        }
    }

    /// Applies one side-effect hook without mutating the carrier it
    /// observes. A hook failure is logged, never propagated: side
    /// effects are best-effort by contract.
    async fn apply_hook(&self, hook: Arc<dyn SideEffectHook>, carrier: Carrier<Envelope>, context: &InvocationContext) -> Carrier<Envelope> {
        if !hook.applies(context) {
            return carrier;
        }
        match carrier {
            Carrier::Unary(value) => {
                if let Err(err) = hook.apply(&value, context).await {
                    warn!(hook = hook.name(), error = %err, "side-effect hook failed");
                }
                Carrier::Unary(value)
            }
            Carrier::Stream(items) => {
                let context = context.clone();
                let out: BoxStream<'static, Result<Envelope, PipelineError>> = items
                    .then(move |item| {
                        let hook = hook.clone();
                        let context = context.clone();
                        async move {
                            if let Ok(value) = &item {
                                if let Err(err) = hook.apply(value, &context).await {
                                    warn!(hook = hook.name(), error = %err, "side-effect hook failed");
                                }
                            }
                            item
                        }
                    })
                    .boxed();
                Carrier::Stream(out)
            }
        }
    }

    /// Dispatches one step invocation based on the incoming carrier shape
    /// (unary or stream) and the step's declared cardinality, bridging
    /// whichever of the four cardinality shapes the step declares
    /// regardless of which carrier shape it arrives in.
    async fn invoke_step(&self, step: &StepDescriptor, carrier: Carrier<Envelope>, context: &InvocationContext) -> Result<Carrier<Envelope>, PipelineError> {
        let type_name = self.step_type_names.get(step.name().as_str()).cloned().unwrap_or_default();

        match (carrier, step.cardinality()) {
            (Carrier::Unary(value), CardinalityShape::OneToOne) => {
                Ok(Carrier::Unary(call_unary_unary(&self.handles, step, &type_name, value, context).await?))
            }
            (Carrier::Unary(value), CardinalityShape::OneToMany) => {
                Ok(Carrier::Stream(call_unary_many(&self.handles, step, value, context).await?))
            }
            (Carrier::Unary(value), CardinalityShape::ManyToOne) => Ok(Carrier::Unary(
                call_many_unary_retried(&self.handles, step, &type_name, vec![value], context).await?,
            )),
            (Carrier::Unary(value), CardinalityShape::ManyToMany) => {
                Ok(Carrier::Stream(call_one_many_many(&self.handles, step, value, context).await?))
            }
            (Carrier::Stream(items), CardinalityShape::OneToOne) => Ok(Carrier::Stream(fan_out_unary_unary(
                self.handles.clone(),
                step.clone(),
                type_name,
                items,
                context.clone(),
            ))),
            (Carrier::Stream(items), CardinalityShape::OneToMany) => {
                Ok(Carrier::Stream(fan_out_unary_many(self.handles.clone(), step.clone(), items, context.clone())))
            }
            (Carrier::Stream(items), CardinalityShape::ManyToOne) => Ok(Carrier::Stream(batch_many_unary(
                self.handles.clone(),
                step.clone(),
                type_name,
                items,
                context.clone(),
            ))),
            (Carrier::Stream(items), CardinalityShape::ManyToMany) => {
                Ok(Carrier::Stream(call_many_many_passthrough(&self.handles, step, items, context).await?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheReaderPool, CacheWriterPool, KeyArbitrator};
    use crate::output_bus::BroadcastOutputBus;
    use crate::transport::{LocalTransportBridge, UnaryFn};
    use async_trait::async_trait;
    use pipeline_domain::{
        BatchingPolicy, CachePolicy, IdempotencyPolicy, ReplayMode, RetryPolicy, RunId, StepName, ThreadSafety,
        TransportBinding, VersionTag,
    };
    use std::sync::atomic::{AtomicUsize as StdAtomicUsize, Ordering as StdOrdering};

    fn unary_step(name: &str) -> StepDescriptor {
        StepDescriptor::new(
            StepName::new(name).unwrap(),
            CardinalityShape::OneToOne,
            TransportBinding::Local,
            CachePolicy::BypassCache,
            OrderingRequirement::Relaxed,
            ThreadSafety::Safe,
            BatchingPolicy::default(),
            RetryPolicy::none(),
            IdempotencyPolicy::ContextStable,
        )
    }

    fn runner_for(local: LocalTransportBridge) -> Runner {
        let arbitrator = Arc::new(KeyArbitrator::new());
        let readers = Arc::new(CacheReaderPool::new());
        let writers = Arc::new(CacheWriterPool::new());
        let invoker = Arc::new(StepInvoker::new(arbitrator, readers, writers, Arc::new(local)));
        let bus = Arc::new(BroadcastOutputBus::new());
        Runner::new(invoker, bus, vec![], HashMap::new(), None, Arc::new(ParkingLot::default()))
    }

    #[tokio::test]
    async fn three_step_unary_pipeline_threads_output_to_input() {
        let local = LocalTransportBridge::new();
        for name in ["a", "b", "c"] {
            let suffix = name.to_string();
            local.register(
                &StepName::new(name).unwrap(),
                Arc::new(UnaryFn(move |v: Envelope, _ctx| {
                    let suffix = suffix.clone();
                    async move {
                        let mut v = v;
                        v[suffix.clone()] = serde_json::json!(true);
                        Ok(v)
                    }
                })),
            );
        }
        let runner = runner_for(local);
        let pipeline = PipelineDescriptor::new(
            "p",
            vec![unary_step("a"), unary_step("b"), unary_step("c")],
            VersionTag::none(),
            ReplayMode::Off,
        )
        .unwrap();

        let context = InvocationContext::new(RunId::new(), VersionTag::none(), ReplayMode::Off);
        let result = runner
            .run(&pipeline, &[], Carrier::unary(serde_json::json!({})), context)
            .await
            .unwrap();

        let Carrier::Unary(value) = result else { panic!("expected a unary carrier") };
        assert_eq!(value, serde_json::json!({"a": true, "b": true, "c": true}));
    }

    #[tokio::test]
    async fn a_failing_step_terminates_the_run_and_parks_the_item() {
        let local = LocalTransportBridge::new();
        local.register(
            &StepName::new("boom").unwrap(),
            Arc::new(UnaryFn(|_v: Envelope, _ctx| async move {
                Err(PipelineError::PermanentStepError("nope".into()))
            })),
        );
        let runner = runner_for(local);
        let pipeline = PipelineDescriptor::new("p", vec![unary_step("boom")], VersionTag::none(), ReplayMode::Off).unwrap();
        let context = InvocationContext::new(RunId::new(), VersionTag::none(), ReplayMode::Off);

        let result = runner.run(&pipeline, &[], Carrier::unary(serde_json::json!({})), context).await;
        assert!(matches!(result, Err(PipelineError::PermanentStepError(_))));
        assert_eq!(runner.parking_lot().size(), 1);
    }

    #[tokio::test]
    async fn stream_fan_out_processes_every_item_relaxed_order() {
        let calls = Arc::new(StdAtomicUsize::new(0));
        let local = LocalTransportBridge::new();
        let calls_clone = calls.clone();
        local.register(
            &StepName::new("touch").unwrap(),
            Arc::new(UnaryFn(move |v: Envelope, _ctx| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, StdOrdering::SeqCst);
                    Ok(v)
                }
            })),
        );
        let runner = runner_for(local);
        let pipeline = PipelineDescriptor::new("p", vec![unary_step("touch")], VersionTag::none(), ReplayMode::Off).unwrap();
        let context = InvocationContext::new(RunId::new(), VersionTag::none(), ReplayMode::Off);

        let items = Carrier::from_vec(vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]);
        let result = runner.run(&pipeline, &[], items, context).await.unwrap();
        let collected = result.collect().await.unwrap();
        assert_eq!(collected.len(), 3);
        assert_eq!(calls.load(StdOrdering::SeqCst), 3);
    }

    struct ReduceOperator;
    #[async_trait]
    impl crate::transport::StepOperator for ReduceOperator {
        async fn call_many_unary(&self, inputs: Vec<Envelope>, _ctx: &InvocationContext) -> Result<Envelope, PipelineError> {
            Ok(serde_json::json!({ "count": inputs.len() }))
        }
    }

    #[tokio::test]
    async fn mixed_correlation_keys_reject_the_batch_before_invocation() {
        let local = LocalTransportBridge::new();
        local.register(&StepName::new("reduce").unwrap(), Arc::new(ReduceOperator));
        let runner = runner_for(local);

        let step = StepDescriptor::new(
            StepName::new("reduce").unwrap(),
            CardinalityShape::ManyToOne,
            TransportBinding::Local,
            CachePolicy::BypassCache,
            OrderingRequirement::Relaxed,
            ThreadSafety::Safe,
            BatchingPolicy::new(10).unwrap(),
            RetryPolicy::none(),
            IdempotencyPolicy::ContextStable,
        );
        let pipeline = PipelineDescriptor::new("p", vec![step], VersionTag::none(), ReplayMode::Off).unwrap();
        let context = InvocationContext::new(RunId::new(), VersionTag::none(), ReplayMode::Off);

        let items = Carrier::from_vec(vec![
            serde_json::json!({"docId": "d1"}),
            serde_json::json!({"docId": "d2"}),
        ]);
        let result = runner.run(&pipeline, &[], items, context).await.unwrap();
        let collect_result = result.collect().await;
        assert!(matches!(collect_result, Err(PipelineError::PolicyViolation(_))));
    }
}
