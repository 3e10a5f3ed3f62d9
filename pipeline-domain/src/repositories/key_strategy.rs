// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `KeyStrategy` port: resolves a cache key for one item against the
//! invocation context (C2).

use crate::entities::InvocationContext;
use crate::PipelineError;

/// Candidate cache-key derivation strategy, registered with the cache key
/// arbitrator (C2). Implementations must be stateless and cheap to call
/// per item.
pub trait KeyStrategy: Send + Sync {
    /// Resolves a non-blank base key for `item`, or `None` when this
    /// strategy does not apply. A blank string is treated the same as
    /// `None` by callers (empty-key short-circuit).
    fn resolve(&self, item: &serde_json::Value, context: &InvocationContext) -> Result<Option<String>, PipelineError>;

    /// Whether this strategy applies to the step's declared output type.
    /// Strategies with no opinion return `true` for every type and rely
    /// on `priority()` to rank below type-specific strategies.
    fn supports_target(&self, type_name: &str) -> bool;

    /// Lower value wins arbitration ties within the same support group.
    fn priority(&self) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{ReplayMode, RunId, VersionTag};

    struct AlwaysKey(i32);

    impl KeyStrategy for AlwaysKey {
        fn resolve(&self, _item: &serde_json::Value, _ctx: &InvocationContext) -> Result<Option<String>, PipelineError> {
            Ok(Some("fixed".into()))
        }

        fn supports_target(&self, _type_name: &str) -> bool {
            true
        }

        fn priority(&self) -> i32 {
            self.0
        }
    }

    #[test]
    fn generic_strategy_resolves_regardless_of_target_type() {
        let ctx = InvocationContext::new(RunId::new(), VersionTag::none(), ReplayMode::Off);
        let strategy = AlwaysKey(10);
        assert!(strategy.supports_target("Doc"));
        assert_eq!(strategy.resolve(&serde_json::json!({}), &ctx).unwrap(), Some("fixed".into()));
    }
}
