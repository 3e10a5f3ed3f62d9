// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

mod pipeline_run;

pub use pipeline_run::{PipelineRunAggregate, RunStatus};
