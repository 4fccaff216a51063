//! Domain types exchanged with the time-series engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tsgate_core::{Error, FluxDuration, Result};

// ---------------------------------------------------------------
// Points
// ---------------------------------------------------------------

/// A single telemetry point. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, f64>,
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    timestamp_ns: i64,
}

impl Point {
    /// Construct a point, checking the structural invariants:
    /// non-empty measurement, at least one finite field, no line breaks in
    /// any name or value, and a timestamp representable in nanoseconds.
    ///
    /// A measurement starting with `#` would be read as a comment line, and
    /// a trailing `\` would escape the delimiter after it; both are rejected.
    pub fn new(
        measurement: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(Error::validation("measurement must not be empty"));
        }
        if fields.is_empty() {
            return Err(Error::validation("a point needs at least one field"));
        }
        check_token("measurement", &measurement)?;
        if measurement.starts_with('#') {
            return Err(Error::validation("measurement must not start with '#'"));
        }
        for (k, v) in &tags {
            if k.is_empty() || v.is_empty() {
                return Err(Error::validation("tag keys and values must not be empty"));
            }
            check_token("tag key", k)?;
            check_token("tag value", v)?;
        }
        for (k, v) in &fields {
            if k.is_empty() {
                return Err(Error::validation("field keys must not be empty"));
            }
            check_token("field key", k)?;
            if !v.is_finite() {
                return Err(Error::validation(format!("field {} is not a finite number", k)));
            }
        }
        let timestamp_ns = timestamp
            .timestamp_nanos_opt()
            .ok_or_else(|| Error::validation("timestamp is outside the nanosecond range"))?;

        Ok(Self {
            measurement,
            tags,
            fields,
            timestamp,
            timestamp_ns,
        })
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Timestamp as nanoseconds since the Unix epoch.
    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    /// Encode as one line of InfluxDB line protocol.
    pub fn to_line_protocol(&self) -> String {
        crate::line_protocol::encode(self)
    }
}

fn check_token(what: &str, value: &str) -> Result<()> {
    if value.chars().any(|c| c == '\n' || c == '\r') {
        return Err(Error::validation(format!("{} must not contain line breaks", what)));
    }
    if value.ends_with('\\') {
        return Err(Error::validation(format!("{} must not end with a backslash", what)));
    }
    Ok(())
}

// ---------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------

/// How long a bucket keeps data. `every_seconds == 0` means forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub every_seconds: u64,
}

impl RetentionPolicy {
    pub fn infinite() -> Self {
        Self { every_seconds: 0 }
    }

    pub fn is_infinite(&self) -> bool {
        self.every_seconds == 0
    }
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_infinite() {
            write!(f, "infinite")
        } else {
            write!(f, "{}s", self.every_seconds)
        }
    }
}

/// A bucket descriptor as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
    pub org_id: String,
    pub retention: RetentionPolicy,
}

// ---------------------------------------------------------------
// Tasks and runs
// ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// A periodic job registered with the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every: Option<String>,
    pub flux: String,
}

/// What the gateway submits when creating or updating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    pub every: FluxDuration,
    /// Complete task script, including the `option task` header.
    pub flux: String,
    pub description: Option<String>,
}

/// Run status as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Scheduled,
    #[serde(alias = "started")]
    Running,
    Success,
    Failed,
    Canceled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Scheduled => "scheduled",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// One execution of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub task_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------
// Queries and results
// ---------------------------------------------------------------

/// A query body plus the parameters bound to it.
///
/// The body is expected to reference parameters as `params.<name>`; values
/// never appear in the body text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    body: String,
    params: serde_json::Map<String, serde_json::Value>,
}

impl Query {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            params: serde_json::Map::new(),
        }
    }

    /// Bind a named parameter.
    pub fn bind(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn params(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.params
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_str())
    }
}

/// Column metadata from an annotated CSV response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FluxColumn {
    pub name: String,
    pub data_type: String,
    pub group: bool,
}

/// One row of a result table: column name to typed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FluxRecord {
    pub table: i64,
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl FluxRecord {
    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.values.get(column)
    }

    pub fn value(&self) -> Option<f64> {
        self.get("_value").and_then(|v| v.as_f64())
    }

    pub fn measurement(&self) -> Option<&str> {
        self.get("_measurement").and_then(|v| v.as_str())
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.get("_time")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A result table: records sharing the same group key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FluxTable {
    pub index: i64,
    pub columns: Vec<FluxColumn>,
    pub records: Vec<FluxRecord>,
}

/// Flatten tables into their records, in table order.
pub fn flatten_records(tables: Vec<FluxTable>) -> Vec<FluxRecord> {
    tables.into_iter().flat_map(|t| t.records).collect()
}

/// Column-oriented time/value series used for charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub time: Vec<DateTime<Utc>>,
    pub value: Vec<f64>,
}

impl Frame {
    /// Collect every record that has both a time and a numeric value,
    /// ordered by time.
    pub fn from_tables(tables: &[FluxTable]) -> Self {
        let mut rows: Vec<(DateTime<Utc>, f64)> = tables
            .iter()
            .flat_map(|t| t.records.iter())
            .filter_map(|r| Some((r.time()?, r.value()?)))
            .collect();
        rows.sort_by_key(|(t, _)| *t);

        let (time, value): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        Self { time, value }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(v: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([("field1".to_string(), v)])
    }

    #[test]
    fn test_point_rejects_empty_fields() {
        let err = Point::new("cpu", BTreeMap::new(), BTreeMap::new(), Utc::now());
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_point_rejects_line_breaks() {
        let tags = BTreeMap::from([(
            "tenant_id".to_string(),
            "user1\ncpu,tenant_id=user2 field1=1".to_string(),
        )]);
        assert!(Point::new("cpu", tags, fields(1.0), Utc::now()).is_err());
        assert!(Point::new("cpu\r", BTreeMap::new(), fields(1.0), Utc::now()).is_err());
    }

    #[test]
    fn test_point_rejects_comment_and_dangling_escape() {
        let err = Point::new("#cpu", BTreeMap::new(), fields(1.0), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(Point::new("c#pu", BTreeMap::new(), fields(1.0), Utc::now()).is_ok());

        let tags = BTreeMap::from([("tenant_id".to_string(), "user1\\".to_string())]);
        assert!(matches!(
            Point::new("cpu", tags, fields(1.0), Utc::now()),
            Err(Error::Validation(_))
        ));
        assert!(Point::new("cpu\\", BTreeMap::new(), fields(1.0), Utc::now()).is_err());
    }

    #[test]
    fn test_point_rejects_non_finite() {
        assert!(Point::new("cpu", BTreeMap::new(), fields(f64::NAN), Utc::now()).is_err());
        assert!(Point::new("cpu", BTreeMap::new(), fields(f64::INFINITY), Utc::now()).is_err());
    }

    #[test]
    fn test_query_binds_params() {
        let q = Query::new("from(bucket: params.bucket)").bind("bucket", "raw");
        assert_eq!(q.param_str("bucket"), Some("raw"));
        assert_eq!(q.body(), "from(bucket: params.bucket)");
    }

    #[test]
    fn test_frame_orders_by_time() {
        let rec = |t: &str, v: f64| FluxRecord {
            table: 0,
            values: BTreeMap::from([
                ("_time".to_string(), serde_json::json!(t)),
                ("_value".to_string(), serde_json::json!(v)),
            ]),
        };
        let table = FluxTable {
            index: 0,
            columns: Vec::new(),
            records: vec![
                rec("2024-01-01T00:00:02Z", 2.0),
                rec("2024-01-01T00:00:01Z", 1.0),
                FluxRecord {
                    table: 0,
                    values: BTreeMap::from([("_value".to_string(), serde_json::json!("x"))]),
                },
            ],
        };
        let frame = Frame::from_tables(&[table]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.value, vec![1.0, 2.0]);
    }

    #[test]
    fn test_run_status_accepts_started() {
        let s: RunStatus = serde_json::from_str("\"started\"").unwrap();
        assert_eq!(s, RunStatus::Running);
    }
}
