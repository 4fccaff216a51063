//! Deadline decorator: every collaborator call gets a bounded lifetime.
//!
//! Expiry surfaces as `Error::Timeout`, which is classified retryable. No
//! retry happens here; that is left to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use tsgate_core::{Error, Result};

use crate::client::EngineClient;
use crate::types::{Bucket, FluxTable, Frame, Point, Query, RetentionPolicy, Run, Task, TaskDefinition};

pub struct DeadlineEngine {
    inner: Arc<dyn EngineClient>,
    deadline: Duration,
}

impl DeadlineEngine {
    pub fn new(inner: Arc<dyn EngineClient>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        T: Send,
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} call '{}' exceeded deadline of {}ms",
                    self.inner.name(),
                    op,
                    self.deadline.as_millis()
                );
                Err(Error::Timeout(format!(
                    "{} did not complete within {}ms",
                    op,
                    self.deadline.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl EngineClient for DeadlineEngine {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.inner.ping()).await
    }

    async fn write(&self, bucket: &str, point: &Point) -> Result<()> {
        self.bounded("write", self.inner.write(bucket, point)).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<FluxTable>> {
        self.bounded("query", self.inner.query(query)).await
    }

    async fn query_frame(&self, query: &Query) -> Result<Frame> {
        self.bounded("query_frame", self.inner.query_frame(query)).await
    }

    async fn find_bucket_by_name(&self, name: &str) -> Result<Bucket> {
        self.bounded("find_bucket_by_name", self.inner.find_bucket_by_name(name))
            .await
    }

    async fn create_bucket(&self, name: &str, retention: RetentionPolicy) -> Result<Bucket> {
        self.bounded("create_bucket", self.inner.create_bucket(name, retention))
            .await
    }

    async fn create_task(&self, definition: &TaskDefinition) -> Result<Task> {
        self.bounded("create_task", self.inner.create_task(definition)).await
    }

    async fn update_task(&self, task_id: &str, definition: &TaskDefinition) -> Result<Task> {
        self.bounded("update_task", self.inner.update_task(task_id, definition))
            .await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.bounded("list_tasks", self.inner.list_tasks()).await
    }

    async fn find_task_by_name(&self, name: &str) -> Result<Option<Task>> {
        self.bounded("find_task_by_name", self.inner.find_task_by_name(name))
            .await
    }

    async fn get_runs(&self, task_id: &str, limit: usize) -> Result<Vec<Run>> {
        self.bounded("get_runs", self.inner.get_runs(task_id, limit)).await
    }
}
