use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Raffle Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::purchase::create_purchase,
        crate::routes::webhook::payment_webhook,
        crate::routes::referral::record_click,
        crate::routes::admin::list_referrers,
        crate::routes::admin::create_referrer,
        crate::routes::admin::create_manual_entry,
        crate::routes::admin::update_entry,
        crate::routes::admin::delete_entry,
        crate::routes::admin::transfer_entries,
        crate::routes::admin::get_totals,
        crate::routes::admin::recalculate_totals,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::purchase::PurchaseRequest,
            crate::dto::purchase::PurchaseResponse,
            crate::dto::webhook::WebhookAck,
            crate::dto::referral::ClickResponse,
            crate::dto::admin::CreateReferrerRequest,
            crate::dto::admin::ReferrerView,
            crate::dto::admin::TallyView,
            crate::dto::admin::ManualEntryRequest,
            crate::dto::admin::UpdateEntryRequest,
            crate::dto::admin::EntryView,
            crate::dto::admin::TransferRequest,
            crate::dto::admin::TransferResponse,
            crate::dto::admin::RecalculateResponse,
            crate::dto::admin::TotalsResponse,
            crate::state::sale::EntryType,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "purchases", description = "Ticket purchases and donations"),
        (name = "webhooks", description = "Payment gateway notifications"),
        (name = "referrals", description = "Referral link tracking"),
        (name = "admin", description = "Referrer management, entry corrections and totals"),
    )
)]
/// OpenAPI document covering every route.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/purchases",
            "/webhooks/payments",
            "/referrals/{code}/click",
            "/admin/referrers",
            "/admin/entries/{id}",
            "/admin/totals/recalculate",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
