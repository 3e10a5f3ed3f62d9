// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Context header propagation (external interfaces testable
//! properties: "context propagation round-trip").
//!
//! Every transport bridge hop carries the same closed set of headers:
//! `x-pipeline-version`, `x-pipeline-replay`, `x-pipeline-cache-policy`.
//! Header names are matched case-insensitively, mirroring the HTTP/2-class
//! wire transport the RPC bridge simulates.

use std::collections::HashMap;

use pipeline_domain::{CachePolicy, InvocationContext, ReplayMode, VersionTag};

pub const HEADER_VERSION: &str = "x-pipeline-version";
pub const HEADER_REPLAY: &str = "x-pipeline-replay";
pub const HEADER_CACHE_POLICY: &str = "x-pipeline-cache-policy";

/// A small, case-insensitive header bag. Not a general-purpose map: it
/// exists only to carry the closed set of context headers across a
/// transport hop.
#[derive(Debug, Clone, Default)]
pub struct ContextHeaders(HashMap<String, String>);

impl ContextHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(Self::normalize(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&Self::normalize(name)).map(String::as_str)
    }

    /// Builds the header set from an outgoing invocation context.
    pub fn from_context(context: &InvocationContext, cache_policy: CachePolicy) -> Self {
        let mut headers = Self::new();
        if let Some(tag) = context.version_tag().as_str() {
            headers.insert(HEADER_VERSION, tag);
        }
        headers.insert(HEADER_REPLAY, replay_mode_to_header(context.replay_mode()));
        headers.insert(HEADER_CACHE_POLICY, cache_policy.to_string());
        headers
    }

    /// Recovers ambient values from headers, falling back to the values
    /// already present on `context` for any header not carried: blank
    /// values on the ingress are replaced by context values, non-blank
    /// values are preserved.
    pub fn merge_into(&self, version_tag: &VersionTag, replay_mode: ReplayMode) -> (VersionTag, ReplayMode) {
        let version = match self.get(HEADER_VERSION) {
            Some(v) if !v.trim().is_empty() => VersionTag::new(v),
            _ => version_tag.clone(),
        };
        let replay = match self.get(HEADER_REPLAY).and_then(replay_mode_from_header) {
            Some(r) => r,
            None => replay_mode,
        };
        (version, replay)
    }
}

fn replay_mode_to_header(mode: ReplayMode) -> &'static str {
    match mode {
        ReplayMode::Off => "off",
        ReplayMode::Dry => "dry",
        ReplayMode::Live => "live",
    }
}

fn replay_mode_from_header(value: &str) -> Option<ReplayMode> {
    match value {
        "off" => Some(ReplayMode::Off),
        "dry" => Some(ReplayMode::Dry),
        "live" => Some(ReplayMode::Live),
        _ => None,
    }
}
