//! Shared application state.

use std::sync::Arc;

use tsgate_core::GatewayConfig;
use tsgate_engine::{EngineClient, RetentionPolicy};
use tsgate_ingest::Ingester;
use tsgate_monitor::HealthAggregator;
use tsgate_query::QueryBuilder;
use tsgate_tasks::{BucketLifecycle, TaskRegistrar};

/// Shared application state accessible from all route handlers.
///
/// Read-only after construction; every component holds the same engine
/// handle.
pub struct AppState {
    pub config: GatewayConfig,
    pub engine: Arc<dyn EngineClient>,
    pub ingester: Ingester,
    pub queries: QueryBuilder,
    pub buckets: Arc<BucketLifecycle>,
    pub registrar: TaskRegistrar,
    pub monitor: HealthAggregator,
}

impl AppState {
    pub fn new(config: GatewayConfig, engine: Arc<dyn EngineClient>) -> Self {
        let retention = RetentionPolicy {
            every_seconds: config.retention_seconds,
        };
        let buckets = Arc::new(BucketLifecycle::new(engine.clone(), retention));
        let registrar = TaskRegistrar::new(engine.clone(), buckets.clone(), config.task_policy);

        Self {
            ingester: Ingester::new(engine.clone(), config.raw_bucket.clone()),
            queries: QueryBuilder::new(config.query_window),
            monitor: HealthAggregator::new(engine.clone(), config.usage_window),
            buckets,
            registrar,
            engine,
            config,
        }
    }
}
