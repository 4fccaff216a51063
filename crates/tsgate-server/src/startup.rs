//! Startup provisioning of the raw bucket.

use tracing::{info, warn};
use tsgate_core::Result;
use tsgate_engine::Bucket;

use crate::state::AppState;

/// Make sure the raw bucket exists before the listener is bound.
///
/// Missing permissions are fatal and come back as `Err`. Any other failure
/// is logged and yields `Ok(None)`: the server still starts and ingest
/// reports the missing bucket per request.
pub async fn provision_raw_bucket(state: &AppState) -> Result<Option<Bucket>> {
    let name = &state.config.raw_bucket;
    match state.buckets.provision(name).await {
        Ok(bucket) => {
            info!("Bucket {} ready (retention {})", bucket.name, bucket.retention);
            Ok(Some(bucket))
        }
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            warn!("Could not provision {}: {}", name, e);
            Ok(None)
        }
    }
}
