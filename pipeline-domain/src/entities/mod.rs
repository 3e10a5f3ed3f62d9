// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Entities: objects with identity that persists across mutation (data
//! model).

mod cache_entry;
mod in_flight_sample;
mod invocation_context;
mod pipeline_descriptor;
mod step_descriptor;

pub use cache_entry::CacheEntry;
pub use in_flight_sample::{InFlightSample, InFlightWindow};
pub use invocation_context::InvocationContext;
pub use pipeline_descriptor::PipelineDescriptor;
pub use step_descriptor::StepDescriptor;
