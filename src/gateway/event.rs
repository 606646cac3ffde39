//! Webhook event envelope as delivered by the gateway.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::state::sale::Money;

/// Event type announcing a completed charge.
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    /// Event id.
    pub id: String,
    /// Event type, e.g. `payment_intent.succeeded`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub data: EventData,
}

/// Wrapper around the object the event is about.
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    /// Raw object, decoded on demand.
    pub object: Value,
}

/// Payment intent object carried by `payment_intent.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentObject {
    /// Intent id.
    pub id: String,
    /// Requested amount in cents.
    #[serde(default)]
    pub amount: i64,
    /// Captured amount in cents.
    #[serde(default)]
    pub amount_received: Option<i64>,
    /// Metadata attached at creation.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl GatewayEvent {
    /// Decode a raw webhook body.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Whether this is a `payment_intent.succeeded` event.
    pub fn is_payment_succeeded(&self) -> bool {
        self.event_type == PAYMENT_INTENT_SUCCEEDED
    }

    /// Decode the event object as a payment intent.
    pub fn intent(&self) -> Result<IntentObject, serde_json::Error> {
        IntentObject::deserialize(&self.data.object)
    }
}

impl IntentObject {
    /// Amount the gateway reports as collected, in the smallest currency unit.
    pub fn received(&self) -> Money {
        Money::from_cents(self.amount_received.unwrap_or(self.amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_succeeded_intent_event() {
        let payload = br#"{
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": {
                "id": "pi_123",
                "amount": 5200,
                "amount_received": 5200,
                "metadata": { "entry_type": "raffle", "referral_code": "JaneD" }
            } }
        }"#;
        let event = GatewayEvent::parse(payload).unwrap();
        assert!(event.is_payment_succeeded());
        let intent = event.intent().unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.received(), Money::from_cents(5200));
        assert_eq!(intent.metadata["referral_code"], "JaneD");
    }

    #[test]
    fn other_event_types_are_recognised() {
        let payload = br#"{"id":"evt_2","type":"charge.refunded","data":{"object":{}}}"#;
        let event = GatewayEvent::parse(payload).unwrap();
        assert!(!event.is_payment_succeeded());
        assert!(event.intent().is_err());
    }
}
