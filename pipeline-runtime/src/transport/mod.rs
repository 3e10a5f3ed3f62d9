// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Transport bridge implementations (C4): local in-process call,
//! simulated RPC stream, and batched function invocation.

mod function;
mod local;
mod rpc;

pub use function::{FunctionTransportBridge, OverflowPolicy, StepFunction};
pub use local::{ExpandFn, LocalTransportBridge, ReduceFn, StepOperator, UnaryFn};
pub use rpc::RpcTransportBridge;
