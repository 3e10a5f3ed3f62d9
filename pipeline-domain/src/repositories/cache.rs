// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `CacheReader` / `CacheWriter` ports: the cache reader/writer pool's
//! backend contract (C3).

use async_trait::async_trait;

use crate::entities::CacheEntry;
use crate::value_objects::CacheKey;
use crate::PipelineError;

/// A cache backend consulted for pre-read. Multiple readers may be
/// registered; the pool consults them in priority order and returns the
/// first hit.
#[async_trait]
pub trait CacheReader: Send + Sync {
    async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, PipelineError>;

    /// Precedence among registered readers; lower wins, mirroring
    /// `KeyStrategy::priority`.
    fn priority(&self) -> i32 {
        0
    }
}

/// A cache backend written to on step completion. Writes are dispatched to
/// every registered writer without waiting for completion; a backend
/// failure must never become a pipeline failure.
#[async_trait]
pub trait CacheWriter: Send + Sync {
    async fn write(&self, entry: CacheEntry) -> Result<(), PipelineError>;

    /// Evicts `key`, used by the cache-invalidation side effect when
    /// `replayMode` is live. Backends with no eviction concept (e.g.
    /// an append-only lineage sink registered only as a writer) keep the
    /// default no-op.
    async fn invalidate(&self, _key: &CacheKey) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct MapReader(Arc<RwLock<HashMap<String, CacheEntry>>>);

    #[async_trait]
    impl CacheReader for MapReader {
        async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, PipelineError> {
            Ok(self.0.read().get(key.as_str()).cloned())
        }
    }

    #[tokio::test]
    async fn reader_returns_none_on_miss() {
        let reader = MapReader(Arc::new(RwLock::new(HashMap::new())));
        let result = reader.read(&CacheKey::from_resolved("missing")).await.unwrap();
        assert!(result.is_none());
    }
}
