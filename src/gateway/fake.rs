//! In-process gateway that mints sequential intents and records every request.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use futures::future::BoxFuture;
use serde_json::json;

use super::{
    CreateIntentRequest, CreatedIntent, GatewayError, GatewayResult, PaymentGateway,
    event::PAYMENT_INTENT_SUCCEEDED,
};
use crate::state::sale::Money;

/// Scripted gateway that issues sequential `pi_fake_*` intents.
#[derive(Clone, Default)]
pub struct FakeGateway {
    inner: Arc<FakeInner>,
}

#[derive(Default)]
struct FakeInner {
    next_id: AtomicU64,
    failing: AtomicBool,
    requests: Mutex<Vec<CreateIntentRequest>>,
}

impl FakeGateway {
    /// Gateway that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `create_intent` call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<CreateIntentRequest> {
        self.inner
            .requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Body of a `payment_intent.succeeded` delivery for `intent_id`.
    pub fn succeeded_event(intent_id: &str, amount_received: Money) -> Vec<u8> {
        json!({
            "id": format!("evt_{intent_id}"),
            "type": PAYMENT_INTENT_SUCCEEDED,
            "data": { "object": {
                "id": intent_id,
                "amount": amount_received.cents(),
                "amount_received": amount_received.cents(),
            } },
        })
        .to_string()
        .into_bytes()
    }
}

impl PaymentGateway for FakeGateway {
    fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> BoxFuture<'static, GatewayResult<CreatedIntent>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if inner.failing.load(Ordering::SeqCst) {
                return Err(GatewayError::Simulated("card network unreachable".into()));
            }
            let sequence = inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            if let Ok(mut requests) = inner.requests.lock() {
                requests.push(request);
            }
            let id = format!("pi_fake_{sequence:04}");
            Ok(CreatedIntent {
                client_secret: format!("{id}_secret"),
                id,
            })
        })
    }
}
