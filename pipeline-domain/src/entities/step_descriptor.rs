// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Step descriptor entity: the declarative configuration of a single
//! pipeline step, as parsed from the manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{
    BatchingPolicy, CachePolicy, CardinalityShape, IdempotencyPolicy, OrderingRequirement, RetryPolicy, StepName,
    ThreadSafety, TransportBinding,
};

/// A step's identity and behavior as declared in the pipeline manifest.
///
/// Entities carry identity (`name`); two descriptors with the same name are
/// the same step even if other fields diverge across reloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    name: StepName,
    cardinality: CardinalityShape,
    transport: TransportBinding,
    cache_policy: CachePolicy,
    ordering: OrderingRequirement,
    thread_safety: ThreadSafety,
    batching: BatchingPolicy,
    retry: RetryPolicy,
    idempotency: IdempotencyPolicy,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StepDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: StepName,
        cardinality: CardinalityShape,
        transport: TransportBinding,
        cache_policy: CachePolicy,
        ordering: OrderingRequirement,
        thread_safety: ThreadSafety,
        batching: BatchingPolicy,
        retry: RetryPolicy,
        idempotency: IdempotencyPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            cardinality,
            transport,
            cache_policy,
            ordering,
            thread_safety,
            batching,
            retry,
            idempotency,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn name(&self) -> &StepName {
        &self.name
    }

    pub fn cardinality(&self) -> CardinalityShape {
        self.cardinality
    }

    pub fn transport(&self) -> &TransportBinding {
        &self.transport
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn ordering(&self) -> OrderingRequirement {
        self.ordering
    }

    pub fn thread_safety(&self) -> ThreadSafety {
        self.thread_safety
    }

    pub fn batching(&self) -> BatchingPolicy {
        self.batching
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn idempotency(&self) -> &IdempotencyPolicy {
        &self.idempotency
    }

    pub fn effective_concurrency(&self) -> usize {
        self.thread_safety.effective_concurrency(self.batching.window())
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StepDescriptor {
        StepDescriptor::new(
            StepName::new("fetch").unwrap(),
            CardinalityShape::OneToOne,
            TransportBinding::Local,
            CachePolicy::PreferCache,
            OrderingRequirement::Relaxed,
            ThreadSafety::Safe,
            BatchingPolicy::default(),
            RetryPolicy::default(),
            IdempotencyPolicy::ContextStable,
        )
    }

    #[test]
    fn unsafe_thread_safety_pins_effective_concurrency() {
        let mut d = sample();
        d = StepDescriptor::new(
            d.name.clone(),
            d.cardinality,
            d.transport.clone(),
            d.cache_policy,
            d.ordering,
            ThreadSafety::Unsafe,
            d.batching,
            d.retry,
            IdempotencyPolicy::ContextStable,
        );
        assert_eq!(d.effective_concurrency(), 1);
    }

    #[test]
    fn with_cache_policy_bumps_updated_at() {
        let d = sample();
        let before = d.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        let d = d.with_cache_policy(CachePolicy::RequireCache);
        assert!(d.updated_at >= before);
        assert_eq!(d.cache_policy(), CachePolicy::RequireCache);
    }
}
