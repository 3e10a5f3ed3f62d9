// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Lineage-persistence side effect (`[EXPANDED]`): an append-only
//! record of each primary step's emission, kept for audit and replay
//! diagnosis rather than for serving reads back into the pipeline.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::warn;

use pipeline_domain::{InvocationContext, PipelineError, SideEffectHook};

use crate::side_effects::SideEffectKind;

/// Appends one row per application to a `pipeline_lineage` table. The
/// hook's own failures are logged and swallowed, matching the
/// best-effort contract the cache writer pool applies to its own
/// backends: a lineage outage must never fail a pipeline run.
pub struct LineagePersistSideEffect {
    hook_name: String,
    pool: SqlitePool,
}

impl LineagePersistSideEffect {
    pub fn new(after_step: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            hook_name: SideEffectKind::Persist.hook_name(&after_step.into()),
            pool,
        }
    }

    /// Creates the `pipeline_lineage` table if it does not already exist.
    /// Called once at startup; not part of the `SideEffectHook` contract.
    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), PipelineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pipeline_lineage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                step_name TEXT NOT NULL,
                version_tag TEXT,
                recorded_at TEXT NOT NULL,
                payload_digest TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await
        .map_err(|err| PipelineError::InternalError(err.to_string()))?;
        Ok(())
    }

    fn digest(value: &serde_json::Value) -> String {
        let mut hasher = DefaultHasher::new();
        value.to_string().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[async_trait]
impl SideEffectHook for LineagePersistSideEffect {
    fn name(&self) -> &str {
        &self.hook_name
    }

    fn applies(&self, _context: &InvocationContext) -> bool {
        true
    }

    async fn apply(&self, value: &serde_json::Value, context: &InvocationContext) -> Result<(), PipelineError> {
        let step_name = self.hook_name.trim_start_matches("persist(").trim_end_matches(')');
        let result = sqlx::query(
            "INSERT INTO pipeline_lineage (run_id, step_name, version_tag, recorded_at, payload_digest) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(context.run_id().as_str())
        .bind(step_name)
        .bind(context.version_tag().as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(Self::digest(value))
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            warn!(error = %err, "lineage persistence failed, ignoring per best-effort contract");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::{ReplayMode, RunId, VersionTag};

    async fn memory_pool() -> SqlitePool {
        SqlitePool::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn apply_inserts_one_lineage_row() {
        let pool = memory_pool().await;
        LineagePersistSideEffect::ensure_schema(&pool).await.unwrap();
        let hook = LineagePersistSideEffect::new("fetch", pool.clone());
        let ctx = InvocationContext::new(RunId::new(), VersionTag::none(), ReplayMode::Off);

        hook.apply(&serde_json::json!({"id": "1"}), &ctx).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pipeline_lineage").fetch_one(&pool).await.unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn hook_name_matches_the_expander_convention() {
        let pool = memory_pool().await;
        let hook = LineagePersistSideEffect::new("transform", pool);
        assert_eq!(hook.name(), "persist(transform)");
    }

    #[test]
    fn digest_is_stable_for_identical_payloads() {
        let value = serde_json::json!({"a": 1, "b": [1, 2, 3]});
        assert_eq!(LineagePersistSideEffect::digest(&value), LineagePersistSideEffect::digest(&value));
    }
}
