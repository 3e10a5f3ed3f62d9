// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cache reader/writer pool (C3): priority-ordered lookup on read,
//! best-effort fan-out on write.

use std::sync::Arc;
use tracing::warn;

use pipeline_domain::{CacheEntry, CacheKey, CacheReader, CacheWriter, PipelineError};

/// Multiple `CacheReader`s may be registered; reads consult them in
/// priority order and return the first hit.
#[derive(Clone)]
pub struct CacheReaderPool {
    readers: Vec<Arc<dyn CacheReader>>,
}

impl CacheReaderPool {
    pub fn new() -> Self {
        Self { readers: Vec::new() }
    }

    pub fn register(&mut self, reader: Arc<dyn CacheReader>) -> &mut Self {
        self.readers.push(reader);
        self.readers.sort_by_key(|r| r.priority());
        self
    }

    pub async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, PipelineError> {
        for reader in &self.readers {
            if let Some(entry) = reader.read(key).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl Default for CacheReaderPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes dispatch to every registered writer without waiting for
/// completion; a backend failure must never become a pipeline failure.
#[derive(Clone)]
pub struct CacheWriterPool {
    writers: Vec<Arc<dyn CacheWriter>>,
}

impl CacheWriterPool {
    pub fn new() -> Self {
        Self { writers: Vec::new() }
    }

    pub fn register(&mut self, writer: Arc<dyn CacheWriter>) -> &mut Self {
        self.writers.push(writer);
        self
    }

    /// Fire-and-forget best-effort write: spawns one task per writer and
    /// returns immediately. Write failures are logged, never propagated.
    pub fn write_best_effort(&self, entry: CacheEntry) {
        for writer in self.writers.clone() {
            let entry = entry.clone();
            tokio::spawn(async move {
                if let Err(err) = writer.write(entry).await {
                    warn!(error = %err, "cache write failed, ignoring per best-effort contract");
                }
            });
        }
    }

    /// Fire-and-forget best-effort invalidation, mirroring
    /// `write_best_effort`'s fan-out-without-waiting contract.
    pub fn invalidate_best_effort(&self, key: CacheKey) {
        for writer in self.writers.clone() {
            let key = key.clone();
            tokio::spawn(async move {
                if let Err(err) = writer.invalidate(&key).await {
                    warn!(error = %err, "cache invalidation failed, ignoring per best-effort contract");
                }
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

impl Default for CacheWriterPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_domain::VersionTag;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        priority: i32,
        hits: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CacheReader for CountingReader {
        async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if key.as_str() == self.hits {
                Ok(Some(CacheEntry::new(key.clone(), VersionTag::none(), serde_json::json!(1))))
            } else {
                Ok(None)
            }
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    #[tokio::test]
    async fn readers_are_consulted_in_priority_order_first_hit_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pool = CacheReaderPool::new();
        pool.register(Arc::new(CountingReader {
            priority: 10,
            hits: "never",
            calls: calls.clone(),
        }));
        pool.register(Arc::new(CountingReader {
            priority: 0,
            hits: "Doc:1",
            calls: calls.clone(),
        }));

        let result = pool.read(&CacheKey::from_resolved("Doc:1")).await.unwrap();
        assert!(result.is_some());
        // Only the higher-priority (lower-number) reader should have been
        // consulted before the hit terminated the search.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct FailingWriter;

    #[async_trait]
    impl CacheWriter for FailingWriter {
        async fn write(&self, _entry: CacheEntry) -> Result<(), PipelineError> {
            Err(PipelineError::InternalError("backend unavailable".into()))
        }
    }

    #[tokio::test]
    async fn writer_failures_never_propagate() {
        let mut pool = CacheWriterPool::new();
        pool.register(Arc::new(FailingWriter));
        pool.write_best_effort(CacheEntry::new(
            CacheKey::from_resolved("Doc:1"),
            VersionTag::none(),
            serde_json::json!(1),
        ));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
