//! Raw ingestion request → validated `Point`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tsgate_core::{Error, Result};
use tsgate_engine::Point;

/// Tag key that carries the owning tenant on every point.
pub const TENANT_TAG: &str = "tenant_id";

/// An ingestion request as received, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct PointRequest {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub measurement: String,
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub field_value: Value,
}

impl PointRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        measurement: impl Into<String>,
        field_name: impl Into<String>,
        field_value: Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            measurement: measurement.into(),
            field_name: field_name.into(),
            field_value,
        }
    }
}

/// Turns requests into points stamped with the current time.
#[derive(Debug, Default, Clone, Copy)]
pub struct PointBuilder;

impl PointBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, request: &PointRequest) -> Result<Point> {
        self.build_at(request, Utc::now())
    }

    /// Build with an explicit timestamp.
    pub fn build_at(&self, request: &PointRequest, timestamp: DateTime<Utc>) -> Result<Point> {
        let tenant_id = non_blank("tenant_id", &request.tenant_id)?;
        let measurement = non_blank("measurement", &request.measurement)?;
        let field_name = non_blank("field name", &request.field_name)?;

        let value = match &request.field_value {
            Value::Number(n) => n.as_f64(),
            Value::Null => {
                return Err(Error::validation(format!("{} is required", field_name)));
            }
            _ => None,
        }
        .ok_or_else(|| Error::validation(format!("{} must be a number", field_name)))?;

        Point::new(
            measurement,
            BTreeMap::from([(TENANT_TAG.to_string(), tenant_id.to_string())]),
            BTreeMap::from([(field_name.to_string(), value)]),
            timestamp,
        )
    }
}

fn non_blank<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} is required", what)));
    }
    Ok(value)
}
