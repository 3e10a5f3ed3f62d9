// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Side-effect expansion (C7): manifest-declared synthetic 1→1
//! steps (persistence, cache invalidation) inserted into the effective
//! step order at configuration load time. Side effects observe a step's
//! emission without mutating it.

mod expander;
mod invalidate;
mod persist;

pub use expander::{expand_order, SideEffectKind, SideEffectSpec};
pub use invalidate::InvalidateSideEffect;
pub use persist::LineagePersistSideEffect;
