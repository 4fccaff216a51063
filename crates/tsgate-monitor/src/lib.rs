//! tsgate Monitor: merges usage statistics and task run status into one
//! health report.

pub mod health;

pub use health::{HealthAggregator, HealthReport, RunHealth, TaskHealth, UsageRecord};
