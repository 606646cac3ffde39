use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::webhook::WebhookAck,
    error::AppError,
    gateway::signature::SIGNATURE_HEADER,
    services::webhook_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/webhooks/payments",
    tag = "webhooks",
    params(("Payment-Signature" = String, Header, description = "`t=<unix>,v1=<hex hmac-sha256>` over `t.payload`")),
    request_body(content = String, content_type = "application/json", description = "Raw gateway event"),
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Bad signature or malformed event"),
        (status = 500, description = "Processing failed; the gateway should redeliver")
    )
)]
/// Receive a signed gateway event. The raw body is needed for the signature check.
pub async fn payment_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    webhook_service::handle_payment_webhook(&state, &body, signature)
        .await
        .map(|outcome| Json(outcome.into()))
        .map_err(AppError::from_webhook_failure)
}

/// Configure the webhook routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/webhooks/payments", post(payment_webhook))
}
