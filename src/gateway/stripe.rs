//! Form-encoded HTTP client for a Stripe-compatible `/v1/payment_intents` endpoint.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{CreateIntentRequest, CreatedIntent, GatewayError, GatewayResult, PaymentGateway};

const PAYMENT_INTENTS_PATH: &str = "/v1/payment_intents";

/// Gateway client speaking the Stripe payment-intents API.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    base_url: Arc<str>,
    secret_key: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    /// Build a client for `base_url` authenticated with `secret_key`.
    pub fn new(base_url: &str, secret_key: &str) -> GatewayResult<Self> {
        if secret_key.is_empty() {
            return Err(GatewayError::NotConfigured("secret key is empty"));
        }
        Ok(Self {
            client: Client::new(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
            secret_key: Arc::from(secret_key),
        })
    }

    fn form_fields(request: &CreateIntentRequest) -> Vec<(String, String)> {
        let mut fields = vec![
            ("amount".to_owned(), request.amount.cents().to_string()),
            ("currency".to_owned(), request.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_owned(),
                "true".to_owned(),
            ),
        ];
        if let Some(email) = &request.receipt_email {
            fields.push(("receipt_email".to_owned(), email.clone()));
        }
        fields.extend(
            request
                .metadata
                .iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value.clone())),
        );
        fields
    }

    async fn create(&self, request: CreateIntentRequest) -> GatewayResult<CreatedIntent> {
        let url = format!("{}{}", self.base_url, PAYMENT_INTENTS_PATH);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.secret_key.as_ref())
            .form(&Self::form_fields(&request))
            .send()
            .await
            .map_err(|source| GatewayError::RequestSend {
                path: PAYMENT_INTENTS_PATH.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or_else(|| "no error message".to_owned());
            return Err(GatewayError::Rejected {
                path: PAYMENT_INTENTS_PATH.to_owned(),
                status,
                message,
            });
        }

        let intent = response
            .json::<IntentResponse>()
            .await
            .map_err(|source| GatewayError::DecodeResponse {
                path: PAYMENT_INTENTS_PATH.to_owned(),
                source,
            })?;
        debug!(intent_id = %intent.id, amount = %request.amount, "payment intent created");
        Ok(CreatedIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }
}

impl PaymentGateway for StripeGateway {
    fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> BoxFuture<'static, GatewayResult<CreatedIntent>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.create(request).await })
    }
}
