//! tsgate Engine: the collaborator interface to the time-series engine.
//!
//! `EngineClient` is the seam every orchestration component talks through.
//! Implementations:
//! - `InfluxClient`: InfluxDB v2 HTTP API over reqwest
//! - `MemoryEngine`: in-process engine for tests and local runs
//! - `DeadlineEngine`: decorator bounding every call with a deadline

pub mod client;
pub mod deadline;
pub mod flux;
pub mod flux_csv;
pub mod influx;
pub mod line_protocol;
pub mod memory;
pub mod types;

pub use client::EngineClient;
pub use deadline::DeadlineEngine;
pub use influx::InfluxClient;
pub use memory::MemoryEngine;
pub use types::*;

use std::sync::Arc;

use tsgate_core::{EngineKind, GatewayConfig, Result};

/// Create the engine selected by the configuration, wrapped with its deadline.
pub fn create_engine(config: &GatewayConfig) -> Result<Arc<dyn EngineClient>> {
    let inner: Arc<dyn EngineClient> = match config.engine_kind {
        EngineKind::Influx => {
            tracing::info!("Using InfluxDB engine at {}", config.engine.host);
            Arc::new(InfluxClient::new(&config.engine)?)
        }
        EngineKind::Memory => {
            tracing::info!("Using in-memory engine (no data is persisted)");
            Arc::new(MemoryEngine::new())
        }
    };
    Ok(Arc::new(DeadlineEngine::new(inner, config.deadline)))
}
