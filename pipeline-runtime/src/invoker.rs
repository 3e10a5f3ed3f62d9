// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Step invoker (C5): the per-step pipeline of cache pre-read, the
//! transport call, and a best-effort cache write. Side-effect hooks (C7)
//! are applied by the `Runner`, which treats them as their own entries in
//! the effective step order rather than something the invoker threads
//! through every call shape.

use std::sync::Arc;

use pipeline_domain::{
    CacheEntry, CacheKey, CachePolicy, CardinalityShape, Envelope, EnvelopeStream, InvocationContext, PipelineError,
    StepDescriptor, TransportBridge,
};

use crate::cache::{CacheReaderPool, CacheWriterPool, KeyArbitrator};

/// Drives one step invocation through cache pre-read, the transport call,
/// and cache write. One invoker instance is shared across all steps in a
/// pipeline; per-step behavior comes entirely from the `StepDescriptor` and
/// the `type_name` the caller supplies for cache-key arbitration.
pub struct StepInvoker {
    arbitrator: Arc<KeyArbitrator>,
    cache_readers: Arc<CacheReaderPool>,
    cache_writers: Arc<CacheWriterPool>,
    transport: Arc<dyn TransportBridge>,
}

impl StepInvoker {
    pub fn new(
        arbitrator: Arc<KeyArbitrator>,
        cache_readers: Arc<CacheReaderPool>,
        cache_writers: Arc<CacheWriterPool>,
        transport: Arc<dyn TransportBridge>,
    ) -> Self {
        Self {
            arbitrator,
            cache_readers,
            cache_writers,
            transport,
        }
    }

    /// 1→1 invocation: the only shape participating in cache pre-read,
    /// since it is the only shape with a single stable input to key
    /// against before the call. A `require-cache` miss is a hard
    /// `PolicyViolation`; a `prefer-cache` miss falls through to the
    /// transport call and writes the result back.
    pub async fn invoke_unary_unary(
        &self,
        step: &StepDescriptor,
        type_name: &str,
        request: Envelope,
        context: &InvocationContext,
    ) -> Result<Envelope, PipelineError> {
        debug_assert_eq!(step.cardinality(), CardinalityShape::OneToOne);
        let cache_policy = step.cache_policy();

        let key = if cache_policy.allows_read() {
            self.arbitrator
                .resolve_namespaced(&request, context, type_name, context.version_tag())?
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(entry) = self.cache_readers.read(&CacheKey::from_resolved(key.clone())).await? {
                return Ok(entry.payload().clone());
            }
            if cache_policy == CachePolicy::RequireCache {
                return Err(PipelineError::PolicyViolation(format!(
                    "require-cache miss for step '{}'",
                    step.name()
                )));
            }
        }

        let result = self.transport.invoke_unary_unary(step.name(), request, context).await?;

        if let Some(key) = key {
            if cache_policy.allows_write() {
                self.cache_writers.write_best_effort(CacheEntry::new(
                    CacheKey::from_resolved(key),
                    context.version_tag().clone(),
                    result.clone(),
                ));
            }
        }

        Ok(result)
    }

    /// 1→N invocation. Expansions are not cached individually: the cache
    /// arbitrates one key per invocation, and a stream output has no
    /// single stable identity to key against.
    pub async fn invoke_unary_many(
        &self,
        step: &StepDescriptor,
        request: Envelope,
        context: &InvocationContext,
    ) -> Result<EnvelopeStream, PipelineError> {
        debug_assert_eq!(step.cardinality(), CardinalityShape::OneToMany);
        self.transport.invoke_unary_many(step.name(), request, context).await
    }

    /// N→1 invocation. There is no pre-read (no single input item to key
    /// against before the reduction runs); a cache write, when the policy
    /// allows it, is keyed off the reduction's own output rather than any
    /// of the batch's input keys.
    pub async fn invoke_many_unary(
        &self,
        step: &StepDescriptor,
        type_name: &str,
        requests: EnvelopeStream,
        context: &InvocationContext,
    ) -> Result<Envelope, PipelineError> {
        debug_assert_eq!(step.cardinality(), CardinalityShape::ManyToOne);
        let result = self.transport.invoke_many_unary(step.name(), requests, context).await?;

        if step.cache_policy().allows_write() {
            if let Some(key) =
                self.arbitrator
                    .resolve_namespaced(&result, context, type_name, context.version_tag())?
            {
                self.cache_writers.write_best_effort(CacheEntry::new(
                    CacheKey::from_resolved(key),
                    context.version_tag().clone(),
                    result.clone(),
                ));
            }
        }

        Ok(result)
    }

    /// N→N invocation. Neither pre-read nor write applies: a streaming
    /// transform has no single value to key the cache against.
    pub async fn invoke_many_many(
        &self,
        step: &StepDescriptor,
        requests: EnvelopeStream,
        context: &InvocationContext,
    ) -> Result<EnvelopeStream, PipelineError> {
        debug_assert_eq!(step.cardinality(), CardinalityShape::ManyToMany);
        self.transport.invoke_many_many(step.name(), requests, context).await
    }
}
