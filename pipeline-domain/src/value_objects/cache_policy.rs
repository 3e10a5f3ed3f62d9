// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cache policy value object.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::PipelineError;

/// Governs whether the step invoker pre-reads and writes through the cache.
///
/// `return-cached` is an accepted synonym for `PreferCache`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub enum CachePolicy {
    /// Skip both pre-read and write.
    BypassCache,
    /// Read if available, fall through on miss, always write on completion.
    #[default]
    PreferCache,
    /// Read; on miss, fail the step with `PolicyViolation`; never write.
    RequireCache,
}

impl CachePolicy {
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value {
            "bypass-cache" => Ok(Self::BypassCache),
            "prefer-cache" | "return-cached" => Ok(Self::PreferCache),
            "require-cache" => Ok(Self::RequireCache),
            other => Err(PipelineError::InvalidConfiguration(format!(
                "unknown cache policy '{other}'"
            ))),
        }
    }

    pub fn allows_read(&self) -> bool {
        !matches!(self, Self::BypassCache)
    }

    pub fn allows_write(&self) -> bool {
        matches!(self, Self::PreferCache)
    }
}

impl Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BypassCache => "bypass-cache",
            Self::PreferCache => "prefer-cache",
            Self::RequireCache => "require-cache",
        };
        write!(f, "{s}")
    }
}
