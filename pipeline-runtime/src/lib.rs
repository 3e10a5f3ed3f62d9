// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Reactive Pipeline Runtime
//!
//! Infrastructure crate driving a declaratively-configured pipeline of
//! typed steps, each independently invoked over a local, RPC, or function
//! transport, with per-step caching, bounded retry, in-flight load
//! shedding, and manifest-declared side effects layered in without the
//! primary step logic knowing they exist.
//!
//! ## Components
//!
//! - [`cache`]: key arbitration (C2), the reader/writer pool (C3), and a
//! reference in-memory backend.
//! - [`transport`]: the three transport bridge implementations (C4).
//! - [`invoker`]: the step invoker (C5), wiring cache pre-read,
//!   transport dispatch, and cache write-back around one step call.
//! - [`runner`]: the runner (C6), driving a whole pipeline run from
//!   an input carrier to a terminal emission.
//! - [`side_effects`]: the side-effect expander (C7) and its two
//!   built-in hooks, cache invalidation and lineage persistence.
//! - [`probe`]: the in-flight probe and kill switch (C8).
//! - [`output_bus`]: the broadcast output bus (C9).
//! - [`retry`]: the idempotency/retry policy executor and parking lot
//! (C10).
//! - [`context_headers`]: the closed set of headers carried across every
//! transport hop.
//! - [`manifest`]: the YAML pipeline manifest loader, producing a
//!   `PipelineDescriptor` plus the side-effect specs the expander consumes.

pub mod cache;
pub mod context_headers;
pub mod invoker;
pub mod manifest;
pub mod output_bus;
pub mod probe;
pub mod retry;
pub mod runner;
pub mod side_effects;
pub mod transport;

pub use cache::{CacheReaderPool, CacheWriterPool, InMemoryCacheBackend, KeyArbitrator};
pub use context_headers::ContextHeaders;
pub use invoker::StepInvoker;
pub use manifest::{load as load_manifest, parse as parse_manifest, LoadedManifest};
pub use output_bus::{BroadcastOutputBus, BusOverflowPolicy, Emission};
pub use probe::{InFlightProbe, ProbeMode};
pub use retry::{execute_with_retry, execute_with_retry_generic, ParkedItem, ParkingLot, SharedParkingLot};
pub use runner::Runner;
pub use side_effects::{expand_order, InvalidateSideEffect, LineagePersistSideEffect, SideEffectKind, SideEffectSpec};
pub use transport::{
    ExpandFn, FunctionTransportBridge, LocalTransportBridge, OverflowPolicy, ReduceFn, RpcTransportBridge, StepFunction,
    StepOperator, UnaryFn,
};

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: manifest + end-to-end scenarios in tests/
