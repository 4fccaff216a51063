//! InfluxDB v2 HTTP API client.
//!
//! Non-success responses surface as `Error::Upstream` with the engine's
//! status and body untouched. Callers classify them with `is_auth`,
//! `is_not_found` and `is_conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use tsgate_core::{EngineSettings, Error, Result};

use crate::client::EngineClient;
use crate::flux_csv;
use crate::types::{
    Bucket, FluxTable, Point, Query, RetentionPolicy, Run, RunStatus, Task, TaskDefinition,
    TaskStatus,
};

const TASK_PAGE_LIMIT: usize = 500;

/// Client for one InfluxDB organization.
pub struct InfluxClient {
    http: Client,
    base_url: String,
    org: String,
    token: String,
}

impl InfluxClient {
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        let base_url = settings.host.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "INFLUXDB_HOST must be an http(s) URL, got {:?}",
                settings.host
            )));
        }
        let http = Client::builder()
            .user_agent(concat!("tsgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            org: settings.org.clone(),
            token: settings.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }

    /// Resolve the organization id; bucket creation needs it.
    async fn org_id(&self) -> Result<String> {
        let response = self
            .send(
                self.http
                    .get(self.url("/api/v2/orgs"))
                    .query(&[("org", self.org.as_str())]),
            )
            .await?;
        let orgs: OrgList = response.json().await.map_err(transport_error)?;
        orgs.orgs
            .into_iter()
            .next()
            .map(|o| o.id)
            .ok_or_else(|| Error::NotFound(format!("organization {} not found", self.org)))
    }

    /// Every task of the organization, optionally filtered by name,
    /// following the `after` cursor until a short page comes back.
    async fn fetch_tasks(&self, name: Option<&str>) -> Result<Vec<Task>> {
        let limit = TASK_PAGE_LIMIT.to_string();
        let mut tasks = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut params = vec![("org", self.org.as_str()), ("limit", limit.as_str())];
            if let Some(name) = name {
                params.push(("name", name));
            }
            if let Some(cursor) = after.as_deref() {
                params.push(("after", cursor));
            }
            let response = self
                .send(self.http.get(self.url("/api/v2/tasks")).query(&params))
                .await?;
            let page: TaskList = response.json().await.map_err(transport_error)?;
            let next = next_cursor(&page.tasks, TASK_PAGE_LIMIT);
            tasks.extend(page.tasks.into_iter().map(Task::from));
            match next {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }
        debug!("Fetched {} tasks", tasks.len());
        Ok(tasks)
    }
}

/// Cursor for the page after `page`, or `None` when `page` was the last.
fn next_cursor(page: &[WireTask], limit: usize) -> Option<String> {
    if page.len() < limit {
        return None;
    }
    page.last().map(|t| t.id.clone())
}

#[async_trait]
impl EngineClient for InfluxClient {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    async fn ping(&self) -> Result<()> {
        let response = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await.map(|_| ())
    }

    async fn write(&self, bucket: &str, point: &Point) -> Result<()> {
        let body = point.to_line_protocol();
        debug!("Writing to bucket {}: {}", bucket, body);
        self.send(
            self.http
                .post(self.url("/api/v2/write"))
                .query(&[
                    ("org", self.org.as_str()),
                    ("bucket", bucket),
                    ("precision", "ns"),
                ])
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(body),
        )
        .await?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<FluxTable>> {
        let body = json!({
            "query": query.body(),
            "type": "flux",
            "params": query.params(),
            "dialect": {
                "header": true,
                "delimiter": ",",
                "annotations": ["datatype", "group", "default"],
            },
        });
        let response = self
            .send(
                self.http
                    .post(self.url("/api/v2/query"))
                    .query(&[("org", self.org.as_str())])
                    .header("Accept", "application/csv")
                    .json(&body),
            )
            .await?;
        let text = response.text().await.map_err(transport_error)?;
        flux_csv::decode(&text)
    }

    async fn find_bucket_by_name(&self, name: &str) -> Result<Bucket> {
        let response = self
            .send(
                self.http
                    .get(self.url("/api/v2/buckets"))
                    .query(&[("org", self.org.as_str()), ("name", name)]),
            )
            .await?;
        let list: BucketList = response.json().await.map_err(transport_error)?;
        list.buckets
            .into_iter()
            .find(|b| b.name == name)
            .map(Bucket::from)
            .ok_or_else(|| Error::NotFound(format!("bucket {} not found", name)))
    }

    async fn create_bucket(&self, name: &str, retention: RetentionPolicy) -> Result<Bucket> {
        let org_id = self.org_id().await?;
        let retention_rules = if retention.is_infinite() {
            Vec::new()
        } else {
            vec![WireRetentionRule {
                kind: "expire".into(),
                every_seconds: retention.every_seconds,
            }]
        };
        let body = json!({
            "orgID": org_id,
            "name": name,
            "retentionRules": retention_rules,
        });
        let response = self
            .send(self.http.post(self.url("/api/v2/buckets")).json(&body))
            .await?;
        let bucket: WireBucket = response.json().await.map_err(transport_error)?;
        info!("Created bucket {} (retention {})", bucket.name, retention);
        Ok(bucket.into())
    }

    async fn create_task(&self, definition: &TaskDefinition) -> Result<Task> {
        let body = json!({
            "org": self.org,
            "flux": definition.flux,
            "status": "active",
            "description": definition.description,
        });
        let response = self
            .send(self.http.post(self.url("/api/v2/tasks")).json(&body))
            .await?;
        let task: WireTask = response.json().await.map_err(transport_error)?;
        Ok(task.into())
    }

    async fn update_task(&self, task_id: &str, definition: &TaskDefinition) -> Result<Task> {
        let body = json!({
            "flux": definition.flux,
            "status": "active",
            "description": definition.description,
        });
        let response = self
            .send(
                self.http
                    .patch(self.url(&format!("/api/v2/tasks/{}", task_id)))
                    .json(&body),
            )
            .await?;
        let task: WireTask = response.json().await.map_err(transport_error)?;
        Ok(task.into())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.fetch_tasks(None).await
    }

    async fn find_task_by_name(&self, name: &str) -> Result<Option<Task>> {
        let tasks = self.fetch_tasks(Some(name)).await?;
        Ok(tasks.into_iter().find(|t| t.name == name))
    }

    async fn get_runs(&self, task_id: &str, limit: usize) -> Result<Vec<Run>> {
        let limit = limit.to_string();
        let response = self
            .send(
                self.http
                    .get(self.url(&format!("/api/v2/tasks/{}/runs", task_id)))
                    .query(&[("limit", limit.as_str())]),
            )
            .await?;
        let list: RunList = response.json().await.map_err(transport_error)?;
        let mut runs: Vec<Run> = list.runs.into_iter().map(Run::from).collect();
        // Newest first regardless of the order the server used.
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}

// ---------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_decode() {
        Error::Internal(format!("unexpected response body: {}", e))
    } else {
        Error::Http(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, body))
}

/// Wrap a non-success response. The body is kept as the engine sent it so
/// it can be handed back to the caller unchanged.
pub fn map_status(status: StatusCode, body: String) -> Error {
    Error::Upstream {
        status: status.as_u16(),
        body,
    }
}

// ---------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------

#[derive(Deserialize)]
struct OrgList {
    #[serde(default)]
    orgs: Vec<WireOrg>,
}

#[derive(Deserialize)]
struct WireOrg {
    id: String,
}

#[derive(Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<WireBucket>,
}

#[derive(Serialize, Deserialize)]
struct WireRetentionRule {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "everySeconds", default)]
    every_seconds: u64,
}

#[derive(Deserialize)]
struct WireBucket {
    id: String,
    name: String,
    #[serde(rename = "orgID", default)]
    org_id: String,
    #[serde(rename = "retentionRules", default)]
    retention_rules: Vec<WireRetentionRule>,
}

impl From<WireBucket> for Bucket {
    fn from(w: WireBucket) -> Self {
        let every_seconds = w
            .retention_rules
            .iter()
            .find(|r| r.kind == "expire" || r.kind.is_empty())
            .map(|r| r.every_seconds)
            .unwrap_or(0);
        Bucket {
            id: w.id,
            name: w.name,
            org_id: w.org_id,
            retention: RetentionPolicy { every_seconds },
        }
    }
}

#[derive(Deserialize)]
struct TaskList {
    #[serde(default)]
    tasks: Vec<WireTask>,
}

#[derive(Deserialize)]
struct WireTask {
    id: String,
    #[serde(default)]
    name: String,
    status: TaskStatus,
    #[serde(default)]
    every: Option<String>,
    #[serde(default)]
    flux: String,
}

impl From<WireTask> for Task {
    fn from(w: WireTask) -> Self {
        Task {
            id: w.id,
            name: w.name,
            status: w.status,
            every: w.every,
            flux: w.flux,
        }
    }
}

#[derive(Deserialize)]
struct RunList {
    #[serde(default)]
    runs: Vec<WireRun>,
}

#[derive(Deserialize)]
struct WireRun {
    id: String,
    #[serde(rename = "taskID")]
    task_id: String,
    status: RunStatus,
    #[serde(rename = "startedAt", default)]
    started_at: Option<DateTime<Utc>>,
}

impl From<WireRun> for Run {
    fn from(w: WireRun) -> Self {
        Run {
            id: w.id,
            task_id: w.task_id,
            status: w.status,
            started_at: w.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status_keeps_body() {
        let raw = r#"{"code":"unauthorized","message":"unauthorized access"}"#;
        let e = map_status(StatusCode::UNAUTHORIZED, raw.into());
        assert!(e.is_auth());
        assert!(matches!(e, Error::Upstream { status: 401, ref body } if body == raw));

        let e = map_status(
            StatusCode::NOT_FOUND,
            r#"{"code":"not found","message":"bucket \"raw\" not found"}"#.into(),
        );
        assert!(e.is_not_found());

        let e = map_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":"conflict","message":"bucket with name raw already exists"}"#.into(),
        );
        assert!(e.is_conflict());

        let e = map_status(StatusCode::BAD_REQUEST, "invalid flux".into());
        assert!(matches!(e, Error::Upstream { status: 400, ref body } if body == "invalid flux"));

        let e = map_status(StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert!(e.is_retryable());
    }

    fn wire_tasks(n: usize) -> Vec<WireTask> {
        (0..n)
            .map(|i| WireTask {
                id: format!("t{:04}", i),
                name: format!("user{}_task", i),
                status: TaskStatus::Active,
                every: Some("1m".into()),
                flux: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_task_paging_cursor() {
        assert_eq!(next_cursor(&wire_tasks(TASK_PAGE_LIMIT), TASK_PAGE_LIMIT).as_deref(), Some("t0499"));
        assert_eq!(next_cursor(&wire_tasks(3), TASK_PAGE_LIMIT), None);
        assert_eq!(next_cursor(&[], TASK_PAGE_LIMIT), None);
    }

    #[test]
    fn test_wire_bucket_retention() {
        let w: WireBucket = serde_json::from_str(
            r#"{"id":"b1","name":"raw","orgID":"o1","retentionRules":[{"type":"expire","everySeconds":3600}]}"#,
        )
        .unwrap();
        let b = Bucket::from(w);
        assert_eq!(b.retention.every_seconds, 3600);

        let w: WireBucket = serde_json::from_str(r#"{"id":"b2","name":"forever"}"#).unwrap();
        assert!(Bucket::from(w).retention.is_infinite());
    }

    #[test]
    fn test_wire_run_statuses() {
        let list: RunList = serde_json::from_str(
            r#"{"runs":[{"id":"r1","taskID":"t1","status":"started","startedAt":"2024-01-01T00:00:00Z"},
                        {"id":"r2","taskID":"t1","status":"canceled"}]}"#,
        )
        .unwrap();
        assert_eq!(list.runs[0].status, RunStatus::Running);
        assert_eq!(list.runs[1].status, RunStatus::Canceled);
        assert!(list.runs[1].started_at.is_none());
    }

    #[test]
    fn test_rejects_non_http_host() {
        let settings = EngineSettings {
            host: "localhost:8086".into(),
            org: "acme".into(),
            token: "t".into(),
        };
        assert!(matches!(InfluxClient::new(&settings), Err(Error::Config(_))));
    }
}
