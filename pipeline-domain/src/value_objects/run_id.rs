// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Run identifier: a ULID-based, time-ordered id assigned to each pipeline
//! execution. Threads through `InvocationContext`, the output bus, and the
//! lineage side effect.

use super::generic_id::{GenericId, IdCategory};
use crate::PipelineError;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
pub struct RunId(GenericId<RunMarker>);

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct RunMarker;

impl IdCategory for RunMarker {
    fn category_name() -> &'static str {
        "run"
    }
}

impl RunId {
    pub fn new() -> Self {
        Self(GenericId::new())
    }

    pub fn from_string(s: &str) -> Result<Self, PipelineError> {
        Ok(Self(GenericId::from_string(s)?))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_string() {
        let a = RunId::new();
        let parsed = RunId::from_string(&a.as_str()).unwrap();
        assert_eq!(a, parsed);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(RunId::from_string("not-a-ulid").is_err());
    }
}
