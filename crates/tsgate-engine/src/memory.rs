//! In-process engine.
//!
//! Keeps buckets, points, tasks and runs in memory and evaluates the two
//! query shapes the gateway issues: the parameter-bound tenant query and
//! the usage query. Used by tests and by `TSGATE_ENGINE=memory` runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{json, Value};
use tsgate_core::{Error, Result};
use uuid::Uuid;

use crate::client::EngineClient;
use crate::types::{
    Bucket, FluxColumn, FluxRecord, FluxTable, Point, Query, RetentionPolicy, Run, RunStatus,
    Task, TaskDefinition, TaskStatus,
};

const ORG_ID: &str = "memory-org";

/// `r.<tag> == params.<name>` comparisons are evaluated against point tags.
/// Other predicates in the body are ignored.
static TAG_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"r\.([A-Za-z_][A-Za-z0-9_]*) == params\.([A-Za-z_][A-Za-z0-9_]*)").unwrap());

#[derive(Default)]
struct MemoryState {
    unauthorized: bool,
    buckets: BTreeMap<String, Bucket>,
    points: BTreeMap<String, Vec<Point>>,
    tasks: Vec<Task>,
    runs: BTreeMap<String, Vec<Run>>,
    requests: u64,
    queries: u64,
    stored_bytes: u64,
    bucket_creates: usize,
}

#[derive(Default)]
pub struct MemoryEngine {
    state: RwLock<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Auth` (or succeed again).
    pub fn set_authorized(&self, authorized: bool) {
        self.state.write().unauthorized = !authorized;
    }

    /// Append a run to a task's history and return it.
    pub fn record_run(&self, task_id: &str, status: RunStatus) -> Run {
        let run = Run {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            status,
            started_at: Some(Utc::now()),
        };
        self.state
            .write()
            .runs
            .entry(task_id.to_string())
            .or_default()
            .push(run.clone());
        run
    }

    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) {
        let mut state = self.state.write();
        if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = status;
        }
    }

    /// Number of successful `create_bucket` calls so far.
    pub fn bucket_creates(&self) -> usize {
        self.state.read().bucket_creates
    }

    /// Points stored in a bucket, in write order.
    pub fn points(&self, bucket: &str) -> Vec<Point> {
        self.state
            .read()
            .points
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    fn check_auth(&self) -> Result<()> {
        if self.state.read().unauthorized {
            return Err(Error::Auth("unauthorized access".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EngineClient for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.check_auth()
    }

    async fn write(&self, bucket: &str, point: &Point) -> Result<()> {
        self.check_auth()?;
        let mut state = self.state.write();
        if !state.buckets.contains_key(bucket) {
            return Err(Error::NotFound(format!("bucket \"{}\" not found", bucket)));
        }
        state.requests += 1;
        state.stored_bytes += point.to_line_protocol().len() as u64;
        state
            .points
            .entry(bucket.to_string())
            .or_default()
            .push(point.clone());
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<FluxTable>> {
        self.check_auth()?;
        let mut state = self.state.write();
        // Usage covers traffic before this query.
        let usage = query.body().contains("usage.from").then(|| usage_tables(&state));
        state.requests += 1;
        state.queries += 1;
        if let Some(usage) = usage {
            return Ok(usage);
        }

        let bucket = query
            .param_str("bucket")
            .ok_or_else(|| Error::validation("query has no bucket parameter"))?;
        let start = time_param(query, "start")?;
        let stop = time_param(query, "stop")?;
        let points = state
            .points
            .get(bucket)
            .ok_or_else(|| Error::NotFound(format!("bucket \"{}\" not found", bucket)))?;

        let tag_filters: Vec<(&str, &str)> = TAG_FILTER
            .captures_iter(query.body())
            .filter_map(|c| {
                let tag = c.get(1)?.as_str();
                let value = query.param_str(c.get(2)?.as_str())?;
                Some((tag, value))
            })
            .collect();

        // One table per series: measurement, field and tag set.
        let mut series: BTreeMap<String, Vec<FluxRecord>> = BTreeMap::new();
        for point in points {
            let t = point.timestamp();
            if t < start || t >= stop {
                continue;
            }
            if !tag_filters.iter().all(|(k, v)| point.tag(k) == Some(*v)) {
                continue;
            }
            for (field, value) in point.fields() {
                let key = format!("{}|{}|{:?}", point.measurement(), field, point.tags());
                let mut values = BTreeMap::new();
                values.insert("result".into(), json!("_result"));
                values.insert("_start".into(), json!(rfc3339(start)));
                values.insert("_stop".into(), json!(rfc3339(stop)));
                values.insert("_time".into(), json!(rfc3339(t)));
                values.insert("_value".into(), json!(value));
                values.insert("_field".into(), json!(field));
                values.insert("_measurement".into(), json!(point.measurement()));
                for (k, v) in point.tags() {
                    values.insert(k.clone(), json!(v));
                }
                series
                    .entry(key)
                    .or_default()
                    .push(FluxRecord { table: 0, values });
            }
        }

        let tables = series
            .into_values()
            .enumerate()
            .map(|(index, mut records)| {
                let index = index as i64;
                records.sort_by(|a, b| a.time().cmp(&b.time()));
                for record in &mut records {
                    record.table = index;
                    record.values.insert("table".into(), json!(index));
                }
                let columns = columns_of(&records);
                FluxTable {
                    index,
                    columns,
                    records,
                }
            })
            .collect();
        Ok(tables)
    }

    async fn find_bucket_by_name(&self, name: &str) -> Result<Bucket> {
        self.check_auth()?;
        self.state
            .read()
            .buckets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("bucket \"{}\" not found", name)))
    }

    async fn create_bucket(&self, name: &str, retention: RetentionPolicy) -> Result<Bucket> {
        self.check_auth()?;
        let mut state = self.state.write();
        if state.buckets.contains_key(name) {
            return Err(Error::Conflict(format!(
                "bucket with name {} already exists",
                name
            )));
        }
        let bucket = Bucket {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            org_id: ORG_ID.to_string(),
            retention,
        };
        state.buckets.insert(name.to_string(), bucket.clone());
        state.points.insert(name.to_string(), Vec::new());
        state.bucket_creates += 1;
        Ok(bucket)
    }

    async fn create_task(&self, definition: &TaskDefinition) -> Result<Task> {
        self.check_auth()?;
        let task = Task {
            id: Uuid::new_v4().simple().to_string(),
            name: definition.name.clone(),
            status: TaskStatus::Active,
            every: Some(definition.every.to_string()),
            flux: definition.flux.clone(),
        };
        self.state.write().tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, task_id: &str, definition: &TaskDefinition) -> Result<Task> {
        self.check_auth()?;
        let mut state = self.state.write();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| Error::NotFound(format!("task {} not found", task_id)))?;
        task.name = definition.name.clone();
        task.every = Some(definition.every.to_string());
        task.flux = definition.flux.clone();
        task.status = TaskStatus::Active;
        Ok(task.clone())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.check_auth()?;
        Ok(self.state.read().tasks.clone())
    }

    async fn get_runs(&self, task_id: &str, limit: usize) -> Result<Vec<Run>> {
        self.check_auth()?;
        let state = self.state.read();
        if !state.tasks.iter().any(|t| t.id == task_id) {
            return Err(Error::NotFound(format!("task {} not found", task_id)));
        }
        let runs = state
            .runs
            .get(task_id)
            .map(|runs| runs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(runs)
    }
}

fn time_param(query: &Query, name: &str) -> Result<DateTime<Utc>> {
    let raw = query
        .param_str(name)
        .ok_or_else(|| Error::validation(format!("query has no {} parameter", name)))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::validation(format!("invalid {} time {:?}: {}", name, raw, e)))
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn columns_of(records: &[FluxRecord]) -> Vec<FluxColumn> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    first
        .values
        .iter()
        .map(|(name, value)| FluxColumn {
            name: name.clone(),
            data_type: match value {
                Value::Number(n) if n.is_i64() => "long".into(),
                Value::Number(_) => "double".into(),
                Value::Bool(_) => "boolean".into(),
                _ if name.starts_with("_time") || name == "_start" || name == "_stop" => {
                    "dateTime:RFC3339".into()
                }
                _ => "string".into(),
            },
            group: !matches!(name.as_str(), "_time" | "_value" | "result" | "table"),
        })
        .collect()
}

fn usage_tables(state: &MemoryState) -> Vec<FluxTable> {
    let now = rfc3339(Utc::now());
    let series = [
        ("http_request", "req_count", state.requests),
        ("query_count", "req_count", state.queries),
        ("storage_usage_bucket_bytes", "gauge", state.stored_bytes),
    ];
    series
        .iter()
        .filter(|(_, _, value)| *value > 0)
        .enumerate()
        .map(|(index, (measurement, field, value))| {
            let index = index as i64;
            let values = BTreeMap::from([
                ("result".to_string(), json!("_result")),
                ("table".to_string(), json!(index)),
                ("_time".to_string(), json!(now)),
                ("_measurement".to_string(), json!(measurement)),
                ("_field".to_string(), json!(field)),
                ("_value".to_string(), json!(value)),
            ]);
            let records = vec![FluxRecord {
                table: index,
                values,
            }];
            FluxTable {
                index,
                columns: columns_of(&records),
                records,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tsgate_core::FluxDuration;

    fn point(tenant: &str, value: f64, at: DateTime<Utc>) -> Point {
        Point::new(
            "cpu",
            BTreeMap::from([("tenant_id".to_string(), tenant.to_string())]),
            BTreeMap::from([("field1".to_string(), value)]),
            at,
        )
        .unwrap()
    }

    fn tenant_query(tenant: &str, start: DateTime<Utc>, stop: DateTime<Utc>) -> Query {
        Query::new("from(bucket: params.bucket) |> filter(fn: (r) => r.tenant_id == params.tenant_id)")
            .bind("bucket", "raw")
            .bind("start", rfc3339(start))
            .bind("stop", rfc3339(stop))
            .bind("tenant_id", tenant)
    }

    fn definition(name: &str) -> TaskDefinition {
        TaskDefinition {
            name: name.to_string(),
            every: FluxDuration::parse("1m").unwrap(),
            flux: "option task = {name: \"x\", every: 1m}".to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_write_requires_bucket() {
        let engine = MemoryEngine::new();
        let err = engine.write("raw", &point("user1", 1.0, Utc::now())).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_bucket_conflicts_on_duplicate() {
        let engine = MemoryEngine::new();
        engine.create_bucket("raw", RetentionPolicy::infinite()).await.unwrap();
        let err = engine.create_bucket("raw", RetentionPolicy::infinite()).await;
        assert!(matches!(err, Err(Error::Conflict(_))));
        assert_eq!(engine.bucket_creates(), 1);
    }

    #[tokio::test]
    async fn test_query_filters_tenant_and_window() {
        let engine = MemoryEngine::new();
        engine.create_bucket("raw", RetentionPolicy::infinite()).await.unwrap();
        let now = Utc::now();
        engine.write("raw", &point("user1", 1.0, now - Duration::minutes(5))).await.unwrap();
        engine.write("raw", &point("user2", 2.0, now - Duration::minutes(5))).await.unwrap();
        engine.write("raw", &point("user1", 3.0, now - Duration::hours(2))).await.unwrap();

        let tables = engine
            .query(&tenant_query("user1", now - Duration::hours(1), now))
            .await
            .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].records.len(), 1);
        assert_eq!(tables[0].records[0].value(), Some(1.0));
    }

    #[tokio::test]
    async fn test_usage_query() {
        let engine = MemoryEngine::new();
        engine.create_bucket("raw", RetentionPolicy::infinite()).await.unwrap();
        engine.write("raw", &point("user1", 1.0, Utc::now())).await.unwrap();

        let tables = engine
            .query(&Query::new("import \"experimental/usage\"\nusage.from(start: params.start, stop: params.stop)"))
            .await
            .unwrap();
        let measurements: Vec<_> = tables
            .iter()
            .filter_map(|t| t.records[0].measurement())
            .collect();
        assert!(measurements.contains(&"http_request"));
        assert!(measurements.contains(&"storage_usage_bucket_bytes"));
    }

    #[tokio::test]
    async fn test_tasks_and_runs() {
        let engine = MemoryEngine::new();
        let task = engine.create_task(&definition("user1_task")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert!(engine.get_runs(&task.id, 1).await.unwrap().is_empty());

        engine.record_run(&task.id, RunStatus::Failed);
        engine.record_run(&task.id, RunStatus::Success);
        let runs = engine.get_runs(&task.id, 1).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);

        let found = engine.find_task_by_name("user1_task").await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(task.id.clone()));
        assert!(engine.find_task_by_name("user2_task").await.unwrap().is_none());

        let updated = engine.update_task(&task.id, &definition("user1_task")).await.unwrap();
        assert_eq!(updated.id, task.id);
        assert!(matches!(
            engine.update_task("missing", &definition("x")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let engine = MemoryEngine::new();
        engine.set_authorized(false);
        assert!(matches!(engine.ping().await, Err(Error::Auth(_))));
        assert!(matches!(engine.list_tasks().await, Err(Error::Auth(_))));
    }
}
