//! Payment gateway capability: minting intents, verifying webhook signatures, decoding events.

/// Webhook event payloads.
pub mod event;
/// In-process gateway for tests and local runs.
pub mod fake;
/// Webhook signature signing and verification.
pub mod signature;
/// HTTP client for the Stripe API.
pub mod stripe;

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use thiserror::Error;

use crate::state::sale::Money;

/// Result alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures raised while talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Required credentials are missing.
    #[error("payment gateway is not configured: {0}")]
    NotConfigured(&'static str),
    /// The request could not be sent.
    #[error("failed to send request to payment gateway `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The gateway answered with an error status.
    #[error("payment gateway rejected `{path}` with status {status}: {message}")]
    Rejected {
        path: String,
        status: StatusCode,
        message: String,
    },
    /// The response body could not be decoded.
    #[error("failed to decode payment gateway response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// Scripted failure raised by the in-process gateway.
    #[error("simulated gateway failure: {0}")]
    Simulated(String),
}

/// Parameters of a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntentRequest {
    /// Fee-inclusive amount to charge.
    pub amount: Money,
    /// ISO currency code.
    pub currency: String,
    /// Opaque key/value pairs echoed back on webhook events.
    pub metadata: BTreeMap<String, String>,
    /// Email the gateway sends the receipt to.
    pub receipt_email: Option<String>,
}

/// Intent minted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIntent {
    /// Gateway intent id.
    pub id: String,
    /// Secret the client uses to confirm the payment.
    pub client_secret: String,
}

/// Capability the purchase flow needs from a payment provider.
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for the request.
    fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> BoxFuture<'static, GatewayResult<CreatedIntent>>;
}
