// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Output bus (C9): publishes terminal emissions and run
//! events to every subscriber. Multi-producer (any number of runs publish
//! concurrently), multi-subscriber (any number of downstream bridges
//! listen). Backpressure, not silent drops, is the default: a slow
//! subscriber stalls publication until it drains, unless it was registered
//! with the `DropNewest` overflow policy.

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

use pipeline_domain::{OutputBus, PipelineError, RunEvent};

/// Behavior when a subscriber's bounded channel is full.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BusOverflowPolicy {
    /// Await a free slot; the publisher is held back.
    Backpressure,
    /// Drop the newest message for this subscriber and log a warning,
    /// rather than stall every other subscriber behind a slow one.
    DropNewest,
}

pub struct Emission {
    pub step_name: String,
    pub payload: serde_json::Value,
}

struct Subscriber {
    emissions: mpsc::Sender<Emission>,
    events: mpsc::Sender<RunEvent>,
    overflow: BusOverflowPolicy,
}

/// In-process multi-subscriber output bus, the reference implementation of
/// the `OutputBus` port (-class scope: runnable without an external
/// broker).
#[derive(Default)]
pub struct BroadcastOutputBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl BroadcastOutputBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber with the given channel capacity and
    /// overflow policy, returning its emission and event receivers.
    pub fn subscribe(
        &self,
        capacity: usize,
        overflow: BusOverflowPolicy,
    ) -> (mpsc::Receiver<Emission>, mpsc::Receiver<RunEvent>) {
        let (emissions_tx, emissions_rx) = mpsc::channel(capacity.max(1));
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
        self.subscribers.write().push(Subscriber {
            emissions: emissions_tx,
            events: events_tx,
            overflow,
        });
        (emissions_rx, events_rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[async_trait]
impl OutputBus for BroadcastOutputBus {
    async fn publish_emission(&self, step_name: &str, payload: serde_json::Value) -> Result<(), PipelineError> {
        // Snapshot the senders before any `.await` so the read lock is not
        // held across a yield point.
        let targets: Vec<(mpsc::Sender<Emission>, BusOverflowPolicy)> = self
            .subscribers
            .read()
            .iter()
            .map(|s| (s.emissions.clone(), s.overflow))
            .collect();

        for (sender, overflow) in targets {
            let emission = Emission {
                step_name: step_name.to_string(),
                payload: payload.clone(),
            };
            match overflow {
                BusOverflowPolicy::Backpressure => {
                    if sender.send(emission).await.is_err() {
                        warn!(step = step_name, "output bus subscriber dropped, emission undeliverable");
                    }
                }
                BusOverflowPolicy::DropNewest => {
                    if sender.try_send(emission).is_err() {
                        warn!(step = step_name, "output bus subscriber full, dropping newest emission");
                    }
                }
            }
        }
        Ok(())
    }

    async fn publish_event(&self, event: RunEvent) -> Result<(), PipelineError> {
        let targets: Vec<(mpsc::Sender<RunEvent>, BusOverflowPolicy)> = self
            .subscribers
            .read()
            .iter()
            .map(|s| (s.events.clone(), s.overflow))
            .collect();

        for (sender, overflow) in targets {
            let event = event.clone();
            match overflow {
                BusOverflowPolicy::Backpressure => {
                    if sender.send(event).await.is_err() {
                        warn!("output bus subscriber dropped, event undeliverable");
                    }
                }
                BusOverflowPolicy::DropNewest => {
                    if sender.try_send(event).is_err() {
                        warn!("output bus subscriber full, dropping newest event");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::RunId;

    #[tokio::test]
    async fn every_subscriber_receives_a_published_emission() {
        let bus = BroadcastOutputBus::new();
        let (mut rx_a, _) = bus.subscribe(4, BusOverflowPolicy::Backpressure);
        let (mut rx_b, _) = bus.subscribe(4, BusOverflowPolicy::Backpressure);

        bus.publish_emission("fetch", serde_json::json!({"x": 1})).await.unwrap();

        assert_eq!(rx_a.recv().await.unwrap().step_name, "fetch");
        assert_eq!(rx_b.recv().await.unwrap().step_name, "fetch");
    }

    #[tokio::test]
    async fn drop_newest_subscriber_never_blocks_publication() {
        let bus = BroadcastOutputBus::new();
        let (mut rx, _) = bus.subscribe(1, BusOverflowPolicy::DropNewest);

        bus.publish_emission("a", serde_json::json!(1)).await.unwrap();
        // Second publish overflows the capacity-1 channel; DropNewest must
        // not error or block.
        bus.publish_emission("b", serde_json::json!(2)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().step_name, "a");
    }

    #[tokio::test]
    async fn events_are_delivered_to_the_event_channel() {
        let bus = BroadcastOutputBus::new();
        let (_, mut events_rx) = bus.subscribe(4, BusOverflowPolicy::Backpressure);

        let run_id = RunId::new();
        bus.publish_event(RunEvent::RunCompleted {
            run_id: run_id.clone(),
            occurred_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.run_id(), &run_id);
    }
}
