use axum::Router;

use crate::state::SharedState;

/// Admin routes behind `X-Admin-Token`.
pub mod admin;
/// Swagger UI.
pub mod docs;
/// Healthcheck.
pub mod health;
/// Purchase entry point.
pub mod purchase;
/// Referral link clicks.
pub mod referral;
/// Payment gateway webhooks.
pub mod webhook;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(purchase::router())
        .merge(webhook::router())
        .merge(referral::router())
        .merge(admin::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
