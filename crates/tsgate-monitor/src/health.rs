//! Health report production.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;
use tsgate_core::Result;
use tsgate_engine::{EngineClient, FluxTable, Run, RunStatus, Task, TaskStatus};
use tsgate_query::{usage_query, TimeWindow};

/// Aggregated usage for one category (`_measurement`), e.g. `http_request`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub category: String,
    pub value: f64,
}

/// Health of a task derived from its most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunHealth {
    NoRunYet,
    Running,
    Success,
    Failed,
}

impl RunHealth {
    pub fn classify(last_run: Option<&Run>) -> Self {
        match last_run.map(|r| r.status) {
            None => RunHealth::NoRunYet,
            Some(RunStatus::Scheduled) | Some(RunStatus::Running) => RunHealth::Running,
            Some(RunStatus::Success) => RunHealth::Success,
            Some(RunStatus::Failed) | Some(RunStatus::Canceled) => RunHealth::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunHealth::NoRunYet => "no_run_yet",
            RunHealth::Running => "running",
            RunHealth::Success => "success",
            RunHealth::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskHealth {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    /// `None` for inactive tasks; their runs are not inspected.
    pub health: Option<RunHealth>,
    pub last_run: Option<Run>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub usage: Vec<UsageRecord>,
    pub tasks: Vec<TaskHealth>,
}

pub struct HealthAggregator {
    engine: Arc<dyn EngineClient>,
    usage_window: Duration,
}

impl HealthAggregator {
    pub fn new(engine: Arc<dyn EngineClient>, usage_window: Duration) -> Self {
        Self {
            engine,
            usage_window,
        }
    }

    /// Read usage and the task inventory concurrently, then the latest run
    /// of every active task concurrently. Any failed read fails the report.
    pub async fn produce_report(&self) -> Result<HealthReport> {
        let window = TimeWindow::trailing(self.usage_window)?;
        let query = usage_query(&window);

        let (usage, tasks) = tokio::join!(self.engine.query(&query), self.engine.list_tasks());
        let usage = usage_records(&usage?);
        let tasks = tasks?;
        debug!("Health report: {} usage rows, {} tasks", usage.len(), tasks.len());

        let tasks = join_all(tasks.into_iter().map(|task| self.task_health(task)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        Ok(HealthReport {
            generated_at: Utc::now(),
            usage,
            tasks,
        })
    }

    async fn task_health(&self, task: Task) -> Result<TaskHealth> {
        let (health, last_run) = if task.status == TaskStatus::Active {
            let last_run = self.engine.get_runs(&task.id, 1).await?.into_iter().next();
            (Some(RunHealth::classify(last_run.as_ref())), last_run)
        } else {
            (None, None)
        };
        Ok(TaskHealth {
            id: task.id,
            name: task.name,
            status: task.status,
            health,
            last_run,
        })
    }
}

/// Sum `_value` per `_measurement` across all tables, ordered by category.
fn usage_records(tables: &[FluxTable]) -> Vec<UsageRecord> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for record in tables.iter().flat_map(|t| t.records.iter()) {
        let (Some(category), Some(value)) = (record.measurement(), record.value()) else {
            continue;
        };
        *totals.entry(category.to_string()).or_insert(0.0) += value;
    }
    totals
        .into_iter()
        .map(|(category, value)| UsageRecord { category, value })
        .collect()
}
