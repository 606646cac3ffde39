use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store and report `ok` or `degraded`.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let connected = match state.require_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                false
            }
        },
        Err(_) => {
            warn!("storage unavailable (degraded mode)");
            false
        }
    };
    HealthResponse::from_storage(connected)
}
