//! `succeeded` side of the payment intent lifecycle, driven by gateway webhooks.

use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::{
    dao::{models::IntentCompletion, raffle_store::RaffleStore},
    error::ServiceError,
    gateway::{
        event::{GatewayEvent, IntentObject},
        signature,
    },
    services::{attribution, materializer},
    state::{AppState, intent::IntentEvent},
};

/// How a delivery was handled. Every variant is acknowledged to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event was applied; `entries` sale entries were newly written.
    Processed { intent_id: String, entries: usize },
    /// Redelivery of an intent already handled; no effect.
    AlreadyProcessed { intent_id: String },
    /// Event type or intent this service does not track.
    Ignored { reason: String },
}

/// Authenticate, decode and apply one webhook delivery.
pub async fn handle_payment_webhook(
    state: &AppState,
    payload: &[u8],
    signature_header: Option<&str>,
) -> Result<WebhookOutcome, ServiceError> {
    let config = state.config();
    let secret = config
        .webhook_secret
        .as_deref()
        .ok_or_else(|| ServiceError::Internal("webhook secret is not configured".into()))?;
    let header = signature_header
        .ok_or_else(|| ServiceError::InvalidInput("missing webhook signature".into()))?;
    signature::verify(
        payload,
        header,
        secret,
        config.signature_tolerance,
        SystemTime::now(),
    )
    .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let event = GatewayEvent::parse(payload)
        .map_err(|err| ServiceError::InvalidInput(format!("malformed event: {err}")))?;
    if !event.is_payment_succeeded() {
        debug!(event_id = %event.id, event_type = %event.event_type, "ignoring webhook event");
        return Ok(WebhookOutcome::Ignored {
            reason: format!("event type `{}` is not handled", event.event_type),
        });
    }
    let object = event
        .intent()
        .map_err(|err| ServiceError::InvalidInput(format!("malformed intent object: {err}")))?;

    let store = state.require_store().await?;
    apply_payment_success(store.as_ref(), &object).await
}

/// Apply a confirmed payment to the local intent record and its sale effects.
///
/// The processed flag is flipped last, with a conditional write, so a crash midway leaves the
/// intent retryable and the deterministic entry ids absorb the replay.
pub async fn apply_payment_success(
    store: &dyn RaffleStore,
    object: &IntentObject,
) -> Result<WebhookOutcome, ServiceError> {
    let Some(intent) = store.find_intent(object.id.clone()).await? else {
        warn!(intent_id = %object.id, "webhook for an unknown payment intent");
        return Ok(WebhookOutcome::Ignored {
            reason: format!("payment intent `{}` is not tracked", object.id),
        });
    };
    if intent.webhook_processed {
        info!(intent_id = %intent.id, "webhook replay ignored");
        return Ok(WebhookOutcome::AlreadyProcessed {
            intent_id: intent.id,
        });
    }
    intent.status.apply(IntentEvent::PaymentSucceeded)?;

    let referrer = attribution::resolve(store, intent.terms.referral_code.as_deref()).await?;
    let completion = IntentCompletion {
        amount_received: object.received(),
        referrer_id: referrer.as_ref().map(|referrer| referrer.id),
        succeeded_at: SystemTime::now(),
    };
    if completion.amount_received != intent.terms.charged_amount {
        warn!(
            intent_id = %intent.id,
            expected = %intent.terms.charged_amount,
            received = %completion.amount_received,
            "gateway amount differs from the recorded charge"
        );
    }

    let materialized =
        materializer::materialize(store, &intent, referrer.as_ref(), completion.clone()).await?;
    if !materialized.completed && !store.complete_intent(intent.id.clone(), completion).await? {
        info!(intent_id = %intent.id, "intent completed by a concurrent delivery");
    }

    info!(intent_id = %intent.id, entries = materialized.inserted, "payment processed");
    Ok(WebhookOutcome::Processed {
        intent_id: intent.id,
        entries: materialized.inserted,
    })
}
