// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Tri-state replay mode.
//!
//! Open question, resolved in DESIGN.md: the runtime core only reads this
//! value to gate cache-invalidation side effects — it is not otherwise
//! interpreted by cache policy logic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub enum ReplayMode {
    #[default]
    Off,
    Dry,
    Live,
}

impl ReplayMode {
    /// Whether cache-invalidation side effects should execute: an
    /// invalidation successor runs only when `replayMode` is live.
    pub fn allows_invalidation(&self) -> bool {
        matches!(self, Self::Live)
    }
}
