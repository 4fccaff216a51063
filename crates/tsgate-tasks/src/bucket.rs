//! Find-or-create for named buckets.

use std::sync::Arc;

use tracing::{debug, error, info};
use tsgate_core::{Error, Result};
use tsgate_engine::{Bucket, EngineClient, RetentionPolicy};

/// Ensures buckets exist, creating missing ones with a default retention.
///
/// Check-then-create is not atomic. When two callers race, the loser's
/// create reports `Conflict`, and the loser then looks the bucket up again
/// and returns it.
pub struct BucketLifecycle {
    engine: Arc<dyn EngineClient>,
    retention: RetentionPolicy,
}

impl BucketLifecycle {
    pub fn new(engine: Arc<dyn EngineClient>, retention: RetentionPolicy) -> Self {
        Self { engine, retention }
    }

    /// Return the bucket named `name`, creating it if needed. An existing
    /// bucket is returned unchanged, whatever its retention.
    pub async fn ensure(&self, name: &str) -> Result<Bucket> {
        if name.trim().is_empty() {
            return Err(Error::validation("bucket name is required"));
        }

        match self.engine.find_bucket_by_name(name).await {
            Ok(bucket) => {
                debug!(
                    "Bucket ({}) found with retention policy: {}",
                    bucket.name, bucket.retention
                );
                return Ok(bucket);
            }
            Err(e) if e.is_not_found() => {
                info!("Bucket {} not found, creating it", name);
            }
            Err(e) => return Err(e),
        }

        match self.engine.create_bucket(name, self.retention).await {
            Ok(bucket) => Ok(bucket),
            Err(e) if e.is_conflict() => {
                debug!("Bucket {} was created concurrently, looking it up again", name);
                self.engine.find_bucket_by_name(name).await
            }
            Err(e) => Err(e),
        }
    }

    /// Startup variant of `ensure`. Logs permission failures loudly; the
    /// caller is expected to exit on `Auth`.
    pub async fn provision(&self, name: &str) -> Result<Bucket> {
        match self.ensure(name).await {
            Err(e) if e.is_auth() => {
                error!("Insufficient permissions provisioning bucket {}: {}", name, e);
                Err(e)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tsgate_engine::{FluxTable, MemoryEngine, Point, Query, Run, Task, TaskDefinition};

    fn lifecycle(engine: Arc<MemoryEngine>) -> BucketLifecycle {
        BucketLifecycle::new(engine, RetentionPolicy { every_seconds: 3600 })
    }

    #[tokio::test]
    async fn test_creates_missing_bucket() {
        let engine = Arc::new(MemoryEngine::new());
        let bucket = lifecycle(engine.clone()).ensure("processed_data_bucket").await.unwrap();
        assert_eq!(bucket.name, "processed_data_bucket");
        assert_eq!(bucket.retention.every_seconds, 3600);
        assert_eq!(engine.bucket_creates(), 1);
    }

    #[tokio::test]
    async fn test_sequential_ensure_is_idempotent() {
        let engine = Arc::new(MemoryEngine::new());
        let buckets = lifecycle(engine.clone());
        let first = buckets.ensure("raw").await.unwrap();
        let second = buckets.ensure("raw").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.bucket_creates(), 1);
    }

    #[tokio::test]
    async fn test_existing_bucket_returned_unchanged() {
        let engine = Arc::new(MemoryEngine::new());
        engine.create_bucket("raw", RetentionPolicy::infinite()).await.unwrap();
        let bucket = lifecycle(engine.clone()).ensure("raw").await.unwrap();
        assert!(bucket.retention.is_infinite());
        assert_eq!(engine.bucket_creates(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_converges() {
        let engine = Arc::new(MemoryEngine::new());
        let buckets = Arc::new(lifecycle(engine.clone()));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let buckets = buckets.clone();
                tokio::spawn(async move { buckets.ensure("raw").await })
            })
            .collect();
        let results = futures::future::join_all(handles).await;
        let ids: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap().id)
            .collect();
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(engine.bucket_creates(), 1);
    }

    /// Reports the bucket missing once, as if another writer created it
    /// between our lookup and our create.
    struct RacingEngine {
        inner: MemoryEngine,
        hide_once: AtomicBool,
    }

    #[async_trait]
    impl EngineClient for RacingEngine {
        fn name(&self) -> &'static str {
            "racing"
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn write(&self, bucket: &str, point: &Point) -> Result<()> {
            self.inner.write(bucket, point).await
        }
        async fn query(&self, query: &Query) -> Result<Vec<FluxTable>> {
            self.inner.query(query).await
        }
        async fn find_bucket_by_name(&self, name: &str) -> Result<Bucket> {
            if self.hide_once.swap(false, Ordering::SeqCst) {
                return Err(Error::NotFound(name.to_string()));
            }
            self.inner.find_bucket_by_name(name).await
        }
        async fn create_bucket(&self, name: &str, retention: RetentionPolicy) -> Result<Bucket> {
            self.inner.create_bucket(name, retention).await
        }
        async fn create_task(&self, definition: &TaskDefinition) -> Result<Task> {
            self.inner.create_task(definition).await
        }
        async fn update_task(&self, task_id: &str, definition: &TaskDefinition) -> Result<Task> {
            self.inner.update_task(task_id, definition).await
        }
        async fn list_tasks(&self) -> Result<Vec<Task>> {
            self.inner.list_tasks().await
        }
        async fn get_runs(&self, task_id: &str, limit: usize) -> Result<Vec<Run>> {
            self.inner.get_runs(task_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_success() {
        let inner = MemoryEngine::new();
        let existing = inner.create_bucket("raw", RetentionPolicy::infinite()).await.unwrap();
        let engine = Arc::new(RacingEngine {
            inner,
            hide_once: AtomicBool::new(true),
        });
        let buckets = BucketLifecycle::new(engine, RetentionPolicy::infinite());
        let bucket = buckets.ensure("raw").await.unwrap();
        assert_eq!(bucket, existing);
    }

    #[tokio::test]
    async fn test_auth_error_surfaces() {
        let engine = Arc::new(MemoryEngine::new());
        engine.set_authorized(false);
        let err = lifecycle(engine).provision("raw").await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let err = lifecycle(Arc::new(MemoryEngine::new())).ensure(" ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
