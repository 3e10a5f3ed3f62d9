// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Port traits (repository-style boundaries, per Domain-Driven Design):
//! infrastructure depends on these abstractions, never the reverse.

mod cache;
mod key_strategy;
mod mapper;
mod output_bus;
mod transport_bridge;

pub use cache::{CacheReader, CacheWriter};
pub use key_strategy::KeyStrategy;
pub use mapper::{JsonMapper, Mapper};
pub use output_bus::OutputBus;
pub use transport_bridge::{Envelope, EnvelopeStream, TransportBridge};
