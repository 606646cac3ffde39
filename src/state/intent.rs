//! Payment intent lifecycle: `created -> succeeded`, nothing else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a locally tracked payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Intent minted at the gateway, waiting for the buyer to pay.
    Created,
    /// Gateway confirmed the payment; terminal.
    Succeeded,
}

/// Events that drive an intent forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentEvent {
    /// Gateway delivered `payment_intent.succeeded`.
    PaymentSucceeded,
}

/// Error returned when an event does not apply to the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the intent was in.
    pub from: IntentStatus,
    /// Rejected event.
    pub event: IntentEvent,
}

impl IntentStatus {
    /// Compute the next status for `event`.
    pub fn apply(self, event: IntentEvent) -> Result<IntentStatus, InvalidTransition> {
        match (self, event) {
            (IntentStatus::Created, IntentEvent::PaymentSucceeded) => Ok(IntentStatus::Succeeded),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, IntentStatus::Succeeded)
    }
}
