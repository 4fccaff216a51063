//! Gateway configuration, built once at startup and shared by reference.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::FluxDuration;
use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_RAW_BUCKET: &str = "raw_data_bucket";
pub const DEFAULT_PROCESSED_BUCKET: &str = "processed_data_bucket";
pub const DEFAULT_RETENTION_SECONDS: u64 = 30 * 86_400;
pub const DEFAULT_WINDOW_SECONDS: u64 = 3_600;
pub const DEFAULT_TASK_SCHEDULE: &str = "1m";
pub const DEFAULT_DEADLINE_MS: u64 = 10_000;

/// Which collaborator implementation backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// InfluxDB v2 HTTP API.
    Influx,
    /// In-process engine, for local runs without a database.
    Memory,
}

impl FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "influx" | "influxdb" => Ok(Self::Influx),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!("unknown engine kind: {}", other))),
        }
    }
}

/// What `register()` does when the tenant already owns a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCollisionPolicy {
    /// Update the existing task in place and return its id.
    Upsert,
    /// Always submit a new task.
    Create,
}

impl FromStr for TaskCollisionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upsert" => Ok(Self::Upsert),
            "create" | "always-create" => Ok(Self::Create),
            other => Err(Error::Config(format!("unknown task policy: {}", other))),
        }
    }
}

/// Connection settings for the InfluxDB engine.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Base URL, e.g. `https://us-east-1-1.aws.cloud2.influxdata.com`.
    pub host: String,
    /// Organization name.
    pub org: String,
    #[serde(skip_serializing)]
    pub token: String,
}

impl fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSettings")
            .field("host", &self.host)
            .field("org", &self.org)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP server port.
    pub port: u16,
    pub engine_kind: EngineKind,
    pub engine: EngineSettings,
    /// Bucket that receives ingested points and serves queries.
    pub raw_bucket: String,
    /// Sink bucket for downsampling tasks.
    pub processed_bucket: String,
    /// Retention applied to buckets this gateway creates (0 = infinite).
    pub retention_seconds: u64,
    /// Default trailing window for tenant queries.
    pub query_window: Duration,
    /// Trailing window for usage aggregation on the monitor page.
    pub usage_window: Duration,
    pub task_schedule: FluxDuration,
    pub task_policy: TaskCollisionPolicy,
    /// Deadline applied to every collaborator call.
    pub deadline: Duration,
}

impl GatewayConfig {
    /// Create configuration from the process environment and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let engine_kind = match lookup("TSGATE_ENGINE") {
            Some(v) => v.parse()?,
            None => EngineKind::Influx,
        };

        let required = |key: &str| -> Result<String> {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => Ok(v),
                None if engine_kind == EngineKind::Memory => Ok(String::new()),
                None => Err(Error::Config(format!("{} is not set", key))),
            }
        };

        let engine = EngineSettings {
            host: required("INFLUXDB_HOST")?,
            org: required("INFLUXDB_ORGANIZATION")?,
            token: required("INFLUXDB_TOKEN")?,
        };

        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let retention_seconds =
            parse_or(&lookup, "TSGATE_RETENTION_SECONDS", DEFAULT_RETENTION_SECONDS)?;
        let query_window = Duration::from_secs(parse_or(
            &lookup,
            "TSGATE_QUERY_WINDOW_SECONDS",
            DEFAULT_WINDOW_SECONDS,
        )?);
        let usage_window = Duration::from_secs(parse_or(
            &lookup,
            "TSGATE_USAGE_WINDOW_SECONDS",
            DEFAULT_WINDOW_SECONDS,
        )?);
        let deadline =
            Duration::from_millis(parse_or(&lookup, "TSGATE_DEADLINE_MS", DEFAULT_DEADLINE_MS)?);

        if query_window.is_zero() || usage_window.is_zero() {
            return Err(Error::Config("query and usage windows must be positive".into()));
        }
        if deadline.is_zero() {
            return Err(Error::Config("TSGATE_DEADLINE_MS must be positive".into()));
        }

        let task_schedule = lookup("TSGATE_TASK_SCHEDULE")
            .unwrap_or_else(|| DEFAULT_TASK_SCHEDULE.to_string());
        let task_schedule = FluxDuration::parse(&task_schedule)
            .map_err(|e| Error::Config(format!("TSGATE_TASK_SCHEDULE: {}", e)))?;

        let task_policy = match lookup("TSGATE_TASK_POLICY") {
            Some(v) => v.parse()?,
            None => TaskCollisionPolicy::Upsert,
        };

        Ok(Self {
            port,
            engine_kind,
            engine,
            raw_bucket: lookup("TSGATE_RAW_BUCKET")
                .unwrap_or_else(|| DEFAULT_RAW_BUCKET.to_string()),
            processed_bucket: lookup("TSGATE_PROCESSED_BUCKET")
                .unwrap_or_else(|| DEFAULT_PROCESSED_BUCKET.to_string()),
            retention_seconds,
            query_window,
            usage_window,
            task_schedule,
            task_policy,
            deadline,
        })
    }

    /// Configuration for an in-process engine with all defaults.
    pub fn in_memory() -> Self {
        Self {
            port: DEFAULT_PORT,
            engine_kind: EngineKind::Memory,
            engine: EngineSettings {
                host: String::new(),
                org: "local".into(),
                token: String::new(),
            },
            raw_bucket: DEFAULT_RAW_BUCKET.into(),
            processed_bucket: DEFAULT_PROCESSED_BUCKET.into(),
            retention_seconds: DEFAULT_RETENTION_SECONDS,
            query_window: Duration::from_secs(DEFAULT_WINDOW_SECONDS),
            usage_window: Duration::from_secs(DEFAULT_WINDOW_SECONDS),
            task_schedule: FluxDuration::new_unchecked(DEFAULT_TASK_SCHEDULE),
            task_policy: TaskCollisionPolicy::Upsert,
            deadline: Duration::from_millis(DEFAULT_DEADLINE_MS),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
