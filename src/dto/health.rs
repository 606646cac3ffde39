use serde::Serialize;
use utoipa::ToSchema;

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` while storage answers, `degraded` otherwise.
    pub status: &'static str,
    /// Whether a raffle store is currently installed and answering pings.
    pub storage_connected: bool,
}

impl HealthResponse {
    /// Build the response for the given storage state.
    pub fn from_storage(connected: bool) -> Self {
        Self {
            status: if connected { "ok" } else { "degraded" },
            storage_connected: connected,
        }
    }
}
