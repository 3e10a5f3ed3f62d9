// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Version tag value object: a string namespace prefixed to cache keys so
//! replays under new logic can start from a clean cache.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// May be absent (`None`); a present tag must be non-blank once trimmed.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub struct VersionTag(Option<String>);

impl VersionTag {
    pub fn none() -> Self {
        Self(None)
    }

    /// Constructs a tag from caller input, treating blank/whitespace-only
    /// strings as absent so namespacing logic need only check `is_some`.
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if tag.trim().is_empty() {
            Self(None)
        } else {
            Self(Some(tag))
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    /// Prefixes `base_key` with `"<tag>:"` when present, otherwise returns
    /// it verbatim.
    pub fn namespace(&self, base_key: &str) -> String {
        match &self.0 {
            Some(tag) => format!("{tag}:{base_key}"),
            None => base_key.to_string(),
        }
    }
}

impl Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_deref().unwrap_or(""))
    }
}

impl From<Option<String>> for VersionTag {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(tag) => Self::new(tag),
            None => Self::none(),
        }
    }
}
