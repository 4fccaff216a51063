//! tsgate Core: error taxonomy, configuration, shared value types.

pub mod config;
pub mod duration;
pub mod error;

pub use config::{EngineKind, EngineSettings, GatewayConfig, TaskCollisionPolicy};
pub use duration::FluxDuration;
pub use error::{Error, Result};
