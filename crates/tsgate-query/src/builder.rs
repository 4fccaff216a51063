//! Tenant query construction.

use std::time::Duration;

use serde_json::Value;
use tsgate_core::{Error, Result};
use tsgate_engine::Query;

use crate::predicate::Predicate;
use crate::window::TimeWindow;

/// Body of every tenant range query. Constant: nothing the tenant sends is
/// ever spliced into it.
pub const TENANT_QUERY_BODY: &str = r#"from(bucket: params.bucket)
  |> range(start: time(v: params.start), stop: time(v: params.stop))
  |> filter(fn: (r) => r.tenant_id == params.tenant_id)"#;

/// Usage totals per category over a window.
pub const USAGE_QUERY_BODY: &str = r#"import "experimental/usage"

usage.from(start: time(v: params.start), stop: time(v: params.stop))
  |> toFloat()
  |> group(columns: ["_measurement"])
  |> sum()"#;

const PREDICATE_PARAM_PREFIX: &str = "p";

/// A fully bound tenant query plus the inputs it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantQuery {
    pub tenant_id: String,
    pub bucket: String,
    pub window: TimeWindow,
    pub predicate: Option<Predicate>,
    pub query: Query,
}

/// Builds tenant-scoped queries with a configured default window.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    default_window: Duration,
}

impl QueryBuilder {
    pub fn new(default_window: Duration) -> Self {
        Self { default_window }
    }

    /// Build the query for one tenant over `window`, or over the trailing
    /// default window ending now.
    pub fn tenant_query(
        &self,
        tenant_id: &str,
        bucket: &str,
        window: Option<TimeWindow>,
    ) -> Result<TenantQuery> {
        self.build(tenant_id, bucket, window, None)
    }

    /// Like `tenant_query`, with an extra filter applied after the tenant
    /// filter.
    pub fn filtered_query(
        &self,
        tenant_id: &str,
        bucket: &str,
        window: Option<TimeWindow>,
        predicate: Predicate,
    ) -> Result<TenantQuery> {
        self.build(tenant_id, bucket, window, Some(predicate))
    }

    fn build(
        &self,
        tenant_id: &str,
        bucket: &str,
        window: Option<TimeWindow>,
        predicate: Option<Predicate>,
    ) -> Result<TenantQuery> {
        if tenant_id.trim().is_empty() {
            return Err(Error::validation("tenant_id is required"));
        }
        if bucket.trim().is_empty() {
            return Err(Error::validation("bucket is required"));
        }
        let window = match window {
            Some(w) => w,
            None => TimeWindow::trailing(self.default_window)?,
        };

        let mut body = TENANT_QUERY_BODY.to_string();
        let mut extra: Vec<(String, Value)> = Vec::new();
        if let Some(predicate) = &predicate {
            let rendered = predicate.render_bound(PREDICATE_PARAM_PREFIX, &mut extra)?;
            body.push_str(&format!("\n  |> filter(fn: (r) => {})", rendered));
        }

        let mut query = Query::new(body)
            .bind("bucket", bucket)
            .bind("tenant_id", tenant_id)
            .bind("start", window.start_rfc3339())
            .bind("stop", window.stop_rfc3339());
        for (name, value) in extra {
            query = query.bind(&name, value);
        }

        Ok(TenantQuery {
            tenant_id: tenant_id.to_string(),
            bucket: bucket.to_string(),
            window,
            predicate,
            query,
        })
    }
}

/// Usage totals grouped by category over `window`.
pub fn usage_query(window: &TimeWindow) -> Query {
    Query::new(USAGE_QUERY_BODY)
        .bind("start", window.start_rfc3339())
        .bind("stop", window.stop_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::CompareOp;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tsgate_engine::{EngineClient, MemoryEngine, Point, RetentionPolicy};

    fn builder() -> QueryBuilder {
        QueryBuilder::new(Duration::from_secs(3600))
    }

    const HOSTILE_TENANTS: &[&str] = &[
        "user1",
        "user1\") |> drop(columns: [\"tenant_id\"]) //",
        "\" or true or \"",
        "${params.bucket}",
        "x\n|> yield()",
        "\\\"",
        "",
    ];

    #[test]
    fn test_body_is_constant_for_any_tenant() {
        let b = builder();
        for tenant in HOSTILE_TENANTS.iter().filter(|t| !t.is_empty()) {
            let q = b.tenant_query(tenant, "raw_data_bucket", None).unwrap();
            assert_eq!(q.query.body(), TENANT_QUERY_BODY);
            assert_eq!(q.query.param_str("tenant_id"), Some(*tenant));
        }
    }

    #[test]
    fn test_predicate_body_does_not_depend_on_values() {
        let b = builder();
        let body_for = |tenant: &str, host: &str| {
            b.filtered_query(
                tenant,
                "raw",
                None,
                Predicate::tag_equals("host", host).and(Predicate::field_compare(CompareOp::Gt, 1.0)),
            )
            .unwrap()
            .query
            .body()
            .to_string()
        };
        let reference = body_for("user1", "a");
        assert_eq!(body_for("\" or true", "b\") |> yield()"), reference);
        assert!(reference.ends_with("|> filter(fn: (r) => (r.host == params.p0) and (r._value > params.p1))"));
    }

    #[test]
    fn test_binds_window_and_bucket() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
        let window = TimeWindow::new(start, stop).unwrap();
        let q = builder().tenant_query("user1", "raw", Some(window)).unwrap();
        assert_eq!(q.query.param_str("bucket"), Some("raw"));
        assert_eq!(q.query.param_str("start"), Some("2024-01-01T00:00:00Z"));
        assert_eq!(q.query.param_str("stop"), Some("2024-01-01T02:00:00Z"));
        assert_eq!(q.window, window);
    }

    #[test]
    fn test_default_window_is_trailing() {
        let q = builder().tenant_query("user1", "raw", None).unwrap();
        let span = q.window.stop() - q.window.start();
        assert_eq!(span.num_seconds(), 3600);
    }

    #[test]
    fn test_missing_inputs() {
        let b = builder();
        assert!(matches!(b.tenant_query("", "raw", None), Err(Error::Validation(_))));
        assert!(matches!(b.tenant_query("  ", "raw", None), Err(Error::Validation(_))));
        assert!(matches!(b.tenant_query("user1", "", None), Err(Error::Validation(_))));
    }

    #[test]
    fn test_usage_query_is_constant() {
        let w = TimeWindow::trailing(Duration::from_secs(60)).unwrap();
        let q = usage_query(&w);
        assert_eq!(q.body(), USAGE_QUERY_BODY);
        assert!(q.param_str("start").is_some());
    }

    #[tokio::test]
    async fn test_hostile_tenant_sees_nothing_of_others() {
        let engine: Arc<dyn EngineClient> = Arc::new(MemoryEngine::new());
        engine.create_bucket("raw", RetentionPolicy::infinite()).await.unwrap();
        let point = Point::new(
            "cpu",
            [("tenant_id".to_string(), "user1".to_string())].into(),
            [("field1".to_string(), 1.0)].into(),
            Utc::now() - chrono::Duration::minutes(1),
        )
        .unwrap();
        engine.write("raw", &point).await.unwrap();

        let b = builder();
        let own = b.tenant_query("user1", "raw", None).unwrap();
        assert_eq!(engine.query(&own.query).await.unwrap().len(), 1);

        for tenant in HOSTILE_TENANTS.iter().skip(1).filter(|t| !t.is_empty()) {
            let q = b.tenant_query(tenant, "raw", None).unwrap();
            assert!(engine.query(&q.query).await.unwrap().is_empty());
        }
    }
}
