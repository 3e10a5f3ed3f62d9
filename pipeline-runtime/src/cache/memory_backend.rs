// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Reference in-memory cache backend.
//!
//! Not a production backend — a `HashMap` behind a `parking_lot::RwLock` so
//! the engine is runnable and testable without an external dependency.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use pipeline_domain::{CacheEntry, CacheKey, CacheReader, CacheWriter, PipelineError};

#[derive(Clone, Default)]
pub struct InMemoryCacheBackend {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Test/demo convenience: seeds an entry directly, bypassing the
    /// write path (used to set up "warm cache" scenarios).
    pub fn seed(&self, key: CacheKey, entry: CacheEntry) {
        self.store.write().insert(key.as_str().to_string(), entry);
    }
}

#[async_trait]
impl CacheReader for InMemoryCacheBackend {
    async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, PipelineError> {
        Ok(self.store.read().get(key.as_str()).cloned())
    }

    fn priority(&self) -> i32 {
        0
    }
}

#[async_trait]
impl CacheWriter for InMemoryCacheBackend {
    async fn write(&self, entry: CacheEntry) -> Result<(), PipelineError> {
        self.store.write().insert(entry.key().as_str().to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), PipelineError> {
        self.store.write().remove(key.as_str());
        Ok(())
    }
}
