// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cache key arbitrator (C2): chooses the best `KeyStrategy` for a given
//! `(item, target type)` pair.
//!
//! Arbitration order: strategies whose `supports_target(T)` is true are
//! tried first, most-preferred (lowest `priority()`) first; only if none of
//! those resolves a key do generic strategies (those that claim to support
//! every type) get a turn, again lowest-priority first. Within the winning
//! group, the first strategy to resolve a non-blank key wins outright — the
//! empty-key short-circuit means a blank result from the top candidate in a
//! group does NOT fall through to the next strategy in that same group,
//! only to the next group.

use pipeline_domain::{InvocationContext, KeyStrategy, PipelineError, VersionTag};

/// Registers `KeyStrategy` implementations and arbitrates among them for a
/// given step's declared output type.
pub struct KeyArbitrator {
    strategies: Vec<Box<dyn KeyStrategy>>,
}

impl KeyArbitrator {
    pub fn new() -> Self {
        Self { strategies: Vec::new() }
    }

    pub fn register(&mut self, strategy: Box<dyn KeyStrategy>) -> &mut Self {
        self.strategies.push(strategy);
        self
    }

    /// Resolves a base key (pre-version-namespacing) for `item` against
    /// `type_name`, or `None` if no strategy applies.
    ///
    /// The empty-key short-circuit is normative. If the
    /// highest-priority strategy in the targeted group returns a blank key,
    /// no other targeted strategy is consulted — arbitration moves straight
    /// to the generic group (a genuinely different group, not a fallback
    /// within the same one).
    pub fn resolve(
        &self,
        item: &serde_json::Value,
        context: &InvocationContext,
        type_name: &str,
    ) -> Result<Option<String>, PipelineError> {
        if let Some(key) = self.resolve_in_group(item, context, type_name, true)? {
            return Ok(Some(key));
        }
        self.resolve_in_group(item, context, type_name, false)
    }

    fn resolve_in_group(
        &self,
        item: &serde_json::Value,
        context: &InvocationContext,
        type_name: &str,
        targeted: bool,
    ) -> Result<Option<String>, PipelineError> {
        let mut candidates: Vec<&Box<dyn KeyStrategy>> = self
            .strategies
            .iter()
            .filter(|s| {
                let supports_everything = s.supports_target("");
                if targeted {
                    s.supports_target(type_name) && !supports_everything
                } else {
                    s.supports_target(type_name)
                }
            })
            .collect();
        candidates.sort_by_key(|s| s.priority());

        if let Some(top) = candidates.first() {
            let resolved = top.resolve(item, context)?;
            return Ok(resolved.filter(|k| !k.trim().is_empty()));
        }
        Ok(None)
    }

    /// Resolves and namespaces the key with the invocation's version tag in
    /// one step, the form the step invoker actually consumes.
    pub fn resolve_namespaced(
        &self,
        item: &serde_json::Value,
        context: &InvocationContext,
        type_name: &str,
        version_tag: &VersionTag,
    ) -> Result<Option<String>, PipelineError> {
        Ok(self
            .resolve(item, context, type_name)?
            .map(|base| version_tag.namespace(&base)))
    }
}

impl Default for KeyArbitrator {
    fn default() -> Self {
        Self::new()
    }
}
