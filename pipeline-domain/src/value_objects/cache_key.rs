// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cache key construction: `(versionTag ":")? typeName ":" stableId
//! (":" discriminator)*`.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::value_objects::VersionTag;

/// A fully-resolved, version-namespaced cache key.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the base key `typeName:stableId(:discriminator)*` and
    /// namespaces it with `version_tag`.
    pub fn build(version_tag: &VersionTag, type_name: &str, stable_id: &str, discriminators: &[&str]) -> Self {
        let mut base = format!("{type_name}:{stable_id}");
        for d in discriminators {
            base.push(':');
            base.push_str(d);
        }
        Self(version_tag.namespace(&base))
    }

    /// Wraps an already-resolved key string verbatim (used when a
    /// `KeyStrategy` returns a caller-computed key).
    pub fn from_resolved(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
