//! Ingestion pipeline: request → point → engine write.

use std::sync::Arc;

use tracing::{debug, warn};
use tsgate_core::{Error, Result};
use tsgate_engine::{EngineClient, Point};

use crate::point::{PointBuilder, PointRequest, TENANT_TAG};

/// Writes tenant points into one bucket.
pub struct Ingester {
    engine: Arc<dyn EngineClient>,
    bucket: String,
    builder: PointBuilder,
}

impl Ingester {
    pub fn new(engine: Arc<dyn EngineClient>, bucket: impl Into<String>) -> Self {
        Self {
            engine,
            bucket: bucket.into(),
            builder: PointBuilder::new(),
        }
    }

    /// Validate and write a request. Returns the point that was written.
    pub async fn ingest(&self, request: &PointRequest) -> Result<Point> {
        let point = self.builder.build(request)?;
        debug!(
            "Ingesting {} for tenant {:?} into {}",
            point.measurement(),
            point.tag(TENANT_TAG),
            self.bucket
        );

        match self.engine.write(&self.bucket, &point).await {
            Ok(()) => Ok(point),
            Err(e) if e.is_not_found() => {
                warn!("Write rejected: bucket {} does not exist", self.bucket);
                Err(Error::NotFound(format!("Bucket {} does not exist", self.bucket)))
            }
            Err(e) if e.is_auth() => {
                warn!("Write rejected: insufficient permissions on {}", self.bucket);
                Err(Error::Auth("Insufficient permissions".into()))
            }
            Err(e) => Err(e),
        }
    }
}
