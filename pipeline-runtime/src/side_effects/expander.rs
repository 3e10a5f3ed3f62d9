// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Side-effect expander (C7): given the manifest's declared
//! aspects, inserts each synthetic hook immediately after its target step
//! in the effective invocation order, idempotently.

use serde::{Deserialize, Serialize};

use pipeline_domain::insert_after;

/// The kind of synthetic successor a manifest aspect declares.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum SideEffectKind {
    Persist,
    Invalidate,
}

impl SideEffectKind {
    pub(crate) fn hook_name(&self, after_step: &str) -> String {
        match self {
            Self::Persist => format!("persist({after_step})"),
            Self::Invalidate => format!("invalidate({after_step})"),
        }
    }
}

/// One manifest-declared aspect: a side effect to run after a named step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideEffectSpec {
    pub after_step: String,
    pub kind: SideEffectKind,
}

/// Expands `primary_order` (the pipeline's declared step sequence) with
/// every aspect's synthetic hook, returning the effective order the
/// `Runner` drives. Expansion is idempotent: re-running it against an
/// already-expanded order is a no-op.
pub fn expand_order(primary_order: &[String], aspects: &[SideEffectSpec]) -> Vec<String> {
    let mut order = primary_order.to_vec();
    for aspect in aspects {
        insert_after(&mut order, &aspect.after_step, &aspect.kind.hook_name(&aspect.after_step));
    }
    order
}
