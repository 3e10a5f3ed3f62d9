// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Idempotency/retry policy and parking lot (C10): bounded
//! exponential backoff for locally recoverable errors, and a bounded FIFO
//! parking lot for items that exhausted retries or otherwise need operator
//! attention.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use pipeline_domain::{CorrelationKey, Envelope, PipelineError, RetryPolicy};

/// Executes `attempt` with bounded exponential backoff, retrying only
/// errors `PipelineError::is_recoverable` reports true for. Retries
/// exhausted converts the last recoverable error into
/// `TransientExhausted`; a non-recoverable error (or `Cancelled`) surfaces
/// immediately without consuming a retry.
///
/// Generic over the success type so the `Runner` can reuse the same
/// backoff loop for calls returning a stream-establishing result, not only
/// the `Envelope`-returning unary shape `execute_with_retry` below covers.
pub async fn execute_with_retry_generic<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> Result<T, PipelineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt_number = 1;
    loop {
        match attempt(attempt_number).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_recoverable() => return Err(err),
            Err(err) if policy.should_retry(attempt_number) => {
                warn!(attempt = attempt_number, error = %err, "retrying after a recoverable error");
                tokio::time::sleep(policy.backoff_for_attempt(attempt_number)).await;
                attempt_number += 1;
            }
            Err(err) => return Err(PipelineError::TransientExhausted(err.to_string())),
        }
    }
}

pub async fn execute_with_retry<F, Fut>(policy: RetryPolicy, attempt: F) -> Result<Envelope, PipelineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Envelope, PipelineError>>,
{
    execute_with_retry_generic(policy, attempt).await
}

/// An item set aside after its retries were exhausted, or after a
/// non-recoverable failure an operator may want to inspect.
#[derive(Debug, Clone)]
pub struct ParkedItem {
    pub correlation_key: Option<CorrelationKey>,
    pub error_kind: String,
    pub payload: Envelope,
    pub parked_at: DateTime<Utc>,
}

impl ParkedItem {
    pub fn new(correlation_key: Option<CorrelationKey>, error_kind: impl Into<String>, payload: Envelope) -> Self {
        Self {
            correlation_key,
            error_kind: error_kind.into(),
            payload,
            parked_at: Utc::now(),
        }
    }
}

/// Bounded FIFO-eviction holding area (default capacity 1000): the
/// oldest parked item is dropped once the lot is full rather than
/// rejecting the newest arrival, since a parking lot exists to bound
/// memory, not to apply backpressure.
pub struct ParkingLot {
    capacity: usize,
    items: Mutex<VecDeque<ParkedItem>>,
}

impl ParkingLot {
    pub const DEFAULT_CAPACITY: usize = 1000;
    /// Above this many parked items the lot reports itself not-ready, a
    /// signal the `Runner` can use to slow further admission.
    pub const DEFAULT_READY_THRESHOLD: usize = 25;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn park(&self, item: ParkedItem) {
        let mut items = self.items.lock();
        if items.len() == self.capacity {
            items.pop_front();
        }
        items.push_back(item);
    }

    pub fn size(&self) -> usize {
        self.items.lock().len()
    }

    pub fn snapshot(&self) -> Vec<ParkedItem> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn remove_by_correlation_key(&self, key: &CorrelationKey) -> usize {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|item| item.correlation_key.as_ref() != Some(key));
        before - items.len()
    }

    pub fn remove_by_error_type(&self, error_kind: &str) -> usize {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|item| item.error_kind != error_kind);
        before - items.len()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Whether the lot is below the ready threshold.
    pub fn is_ready(&self, threshold: usize) -> bool {
        self.size() <= threshold
    }
}

impl Default for ParkingLot {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

pub type SharedParkingLot = Arc<ParkingLot>;
