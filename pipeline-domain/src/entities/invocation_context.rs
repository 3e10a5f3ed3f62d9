// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Invocation context entity: carries the per-run state that threads
//! through every step invocation (C1).

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::value_objects::{CorrelationKey, ReplayMode, RunId, VersionTag};

/// Mutable run-scoped registry threaded through every step invocation.
///
/// This is the domain-level counterpart of C1, the context registry: it
/// carries identity (the `RunId`) plus the ambient values steps and side
/// effects consult (version tag, replay mode, correlation key, and a
/// free-form attribute bag for step-to-step handoff).
#[derive(Debug, Clone)]
pub struct InvocationContext {
    run_id: RunId,
    version_tag: VersionTag,
    replay_mode: ReplayMode,
    correlation_key: Option<CorrelationKey>,
    attributes: HashMap<String, String>,
    started_at: DateTime<Utc>,
}

impl InvocationContext {
    pub fn new(run_id: RunId, version_tag: VersionTag, replay_mode: ReplayMode) -> Self {
        Self {
            run_id,
            version_tag,
            replay_mode,
            correlation_key: None,
            attributes: HashMap::new(),
            started_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn version_tag(&self) -> &VersionTag {
        &self.version_tag
    }

    pub fn replay_mode(&self) -> ReplayMode {
        self.replay_mode
    }

    pub fn correlation_key(&self) -> Option<&CorrelationKey> {
        self.correlation_key.as_ref()
    }

    pub fn with_correlation_key(mut self, key: CorrelationKey) -> Self {
        self.correlation_key = Some(key);
        self
    }

    /// Replaces the ambient version tag, e.g. after a transport hop
    /// recovers it from wire headers.
    pub fn with_version_tag(mut self, version_tag: VersionTag) -> Self {
        self.version_tag = version_tag;
        self
    }

    /// Replaces the ambient replay mode, e.g. after a transport hop
    /// recovers it from wire headers.
    pub fn with_replay_mode(mut self, replay_mode: ReplayMode) -> Self {
        self.replay_mode = replay_mode;
        self
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Forks a child context for a single item within a fan-out step,
    /// preserving run identity and ambient values but allowing an
    /// independent correlation key and attribute bag.
    pub fn fork(&self) -> Self {
        Self {
            run_id: self.run_id.clone(),
            version_tag: self.version_tag.clone(),
            replay_mode: self.replay_mode,
            correlation_key: self.correlation_key.clone(),
            attributes: self.attributes.clone(),
            started_at: self.started_at,
        }
    }
}
