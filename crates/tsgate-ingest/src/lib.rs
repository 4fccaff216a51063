//! tsgate Ingest: builds validated telemetry points and writes them.

pub mod ingest;
pub mod point;

pub use ingest::Ingester;
pub use point::{PointBuilder, PointRequest, TENANT_TAG};
