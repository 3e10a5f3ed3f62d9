// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Side-effect hook: the contract synthetic successor steps (persistence,
//! cache invalidation) implement. The expander (C7) inserts these into the
//! effective invocation order at configuration load time.

use async_trait::async_trait;

use crate::entities::InvocationContext;
use crate::PipelineError;

/// A synthetic, always-1→1 step that observes a primary step's emission
/// without mutating it. Side effects must not change `value`; that
/// invariant is enforced by the invoker passing a read-only reference.
#[async_trait]
pub trait SideEffectHook: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this hook should run at all, given the current context
    /// (e.g. an invalidation hook only runs when `replayMode` is live).
    fn applies(&self, context: &InvocationContext) -> bool;

    async fn apply(&self, value: &serde_json::Value, context: &InvocationContext) -> Result<(), PipelineError>;
}

/// Inserts `hook` into `order` immediately after `after_step`, unless an
/// identically-named hook is already present ("expansion is
/// idempotent").
pub fn insert_after(order: &mut Vec<String>, after_step: &str, hook_name: &str) {
    if order.iter().any(|s| s == hook_name) {
        return;
    }
    if let Some(position) = order.iter().position(|s| s == after_step) {
        order.insert(position + 1, hook_name.to_string());
    } else {
        order.push(hook_name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_after_places_the_hook_immediately_following_its_step() {
        let mut order = vec!["fetch".to_string(), "transform".to_string()];
        insert_after(&mut order, "fetch", "persist(fetch)");
        assert_eq!(order, vec!["fetch", "persist(fetch)", "transform"]);
    }

    #[test]
    fn insert_after_is_idempotent() {
        let mut order = vec!["fetch".to_string(), "persist(fetch)".to_string()];
        insert_after(&mut order, "fetch", "persist(fetch)");
        assert_eq!(order, vec!["fetch", "persist(fetch)"]);
    }
}
