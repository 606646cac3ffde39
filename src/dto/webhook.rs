use serde::Serialize;
use utoipa::ToSchema;

use crate::services::webhook_service::WebhookOutcome;

/// Acknowledgement returned to the gateway for every accepted delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Always `true`; the delivery was accepted.
    pub received: bool,
    /// `processed`, `already_processed` or `ignored`.
    pub outcome: &'static str,
    /// Intent the event referred to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
}

impl From<WebhookOutcome> for WebhookAck {
    fn from(value: WebhookOutcome) -> Self {
        let (outcome, intent_id) = match value {
            WebhookOutcome::Processed { intent_id, .. } => ("processed", Some(intent_id)),
            WebhookOutcome::AlreadyProcessed { intent_id } => ("already_processed", Some(intent_id)),
            WebhookOutcome::Ignored { .. } => ("ignored", None),
        };
        Self {
            received: true,
            outcome,
            intent_id,
        }
    }
}
