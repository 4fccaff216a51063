//! tsgate Server: axum HTTP surface over the gateway components.

pub mod error;
pub mod render;
pub mod routes;
pub mod startup;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use startup::provision_raw_bucket;
pub use state::AppState;
