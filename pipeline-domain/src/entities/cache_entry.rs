// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cache entry entity: the envelope a `CacheReader`/`CacheWriter` stores
//! and retrieves, wrapping an opaque serialized payload with lineage
//! metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{CacheKey, VersionTag};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    key: CacheKey,
    version_tag: VersionTag,
    payload: serde_json::Value,
    written_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, version_tag: VersionTag, payload: serde_json::Value) -> Self {
        Self {
            key,
            version_tag,
            payload,
            written_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn version_tag(&self) -> &VersionTag {
        &self.version_tag
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn written_at(&self) -> DateTime<Utc> {
        self.written_at
    }

    /// Whether this entry was written under a different version tag than
    /// the one the caller is running under; a stale entry is never served
    /// back by the reference cache backend.
    pub fn is_stale_under(&self, current: &VersionTag) -> bool {
        self.version_tag != *current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_from_a_different_version_is_stale() {
        let entry = CacheEntry::new(
            CacheKey::from_resolved("Doc:1"),
            VersionTag::new("v1"),
            serde_json::json!({"x": 1}),
        );
        assert!(entry.is_stale_under(&VersionTag::new("v2")));
        assert!(!entry.is_stale_under(&VersionTag::new("v1")));
    }
}
