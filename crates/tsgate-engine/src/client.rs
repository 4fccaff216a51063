//! The `EngineClient` trait.

use async_trait::async_trait;
use tsgate_core::Result;

use crate::types::{Bucket, FluxTable, Frame, Point, Query, RetentionPolicy, Run, Task, TaskDefinition};

/// Operations the gateway needs from the time-series engine.
///
/// Implementations are shared read-only across concurrent requests, so they
/// must be `Send + Sync` and hold no per-request state.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Check that the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Write one point. Fails with `Auth` or `NotFound` (missing bucket).
    async fn write(&self, bucket: &str, point: &Point) -> Result<()>;

    /// Execute a parameter-bound query.
    async fn query(&self, query: &Query) -> Result<Vec<FluxTable>>;

    /// Execute a query and reshape the result into a time/value frame.
    async fn query_frame(&self, query: &Query) -> Result<Frame> {
        let tables = self.query(query).await?;
        Ok(Frame::from_tables(&tables))
    }

    /// Look up a bucket. Fails with `NotFound` when it does not exist.
    async fn find_bucket_by_name(&self, name: &str) -> Result<Bucket>;

    /// Create a bucket. Fails with `Conflict` when the name is taken.
    async fn create_bucket(&self, name: &str, retention: RetentionPolicy) -> Result<Bucket>;

    async fn create_task(&self, definition: &TaskDefinition) -> Result<Task>;

    /// Replace the script of an existing task.
    async fn update_task(&self, task_id: &str, definition: &TaskDefinition) -> Result<Task>;

    /// Every task of the organization.
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// The task named `name`, if any.
    async fn find_task_by_name(&self, name: &str) -> Result<Option<Task>> {
        let tasks = self.list_tasks().await?;
        Ok(tasks.into_iter().find(|t| t.name == name))
    }

    /// Most recent runs of a task, newest first, at most `limit` entries.
    async fn get_runs(&self, task_id: &str, limit: usize) -> Result<Vec<Run>>;
}
