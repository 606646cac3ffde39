use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_valid::Valid;
use rust_decimal::Decimal;

use crate::{
    dto::admin::{
        CreateReferrerRequest, EntryView, ManualEntryRequest, RecalculateResponse, ReferrerView,
        TotalsResponse, TransferRequest, TransferResponse, UpdateEntryRequest,
    },
    error::AppError,
    services::{
        attribution,
        entry_service::{self, EntryCorrection, ManualEntry},
        recalculation,
    },
    state::{SharedState, sale::{Money, PurchaserInfo}},
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints for referrers, entry corrections and aggregate repair.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/referrers", get(list_referrers).post(create_referrer))
        .route("/admin/entries", post(create_manual_entry))
        .route("/admin/entries/{id}", put(update_entry).delete(delete_entry))
        .route("/admin/entries/transfer", post(transfer_entries))
        .route("/admin/totals", get(get_totals))
        .route("/admin/totals/recalculate", post(recalculate_totals))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

fn to_money(amount: Decimal) -> Result<Money, AppError> {
    Money::from_decimal(amount).map_err(|err| AppError::BadRequest(err.to_string()))
}

/// List referrers with their cached totals.
#[utoipa::path(
    get,
    path = "/admin/referrers",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token")),
    responses((status = 200, description = "Known referrers", body = [ReferrerView]))
)]
pub async fn list_referrers(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ReferrerView>>, AppError> {
    let store = state.require_store().await?;
    let referrers = attribution::list_referrers(store.as_ref()).await?;
    Ok(Json(referrers.into_iter().map(Into::into).collect()))
}

/// Register a referrer, deriving the referral code from the name when none is given.
#[utoipa::path(
    post,
    path = "/admin/referrers",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token")),
    request_body = CreateReferrerRequest,
    responses(
        (status = 201, description = "Referrer created", body = ReferrerView),
        (status = 400, description = "Invalid name or referral code already taken")
    )
)]
pub async fn create_referrer(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateReferrerRequest>>,
) -> Result<(StatusCode, Json<ReferrerView>), AppError> {
    let store = state.require_store().await?;
    let referrer = attribution::create_referrer(
        store.as_ref(),
        &payload.name,
        payload.referral_code.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(referrer.into())))
}

/// Record a sale made outside the payment flow.
#[utoipa::path(
    post,
    path = "/admin/entries",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token")),
    request_body = ManualEntryRequest,
    responses((status = 201, description = "Entry recorded", body = EntryView))
)]
pub async fn create_manual_entry(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<ManualEntryRequest>>,
) -> Result<(StatusCode, Json<EntryView>), AppError> {
    let store = state.require_store().await?;
    let manual = ManualEntry {
        ticket_count: payload.ticket_count,
        amount_paid: to_money(payload.amount)?,
        purchaser: PurchaserInfo {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
        },
        referral_code: payload.referral_code,
        source_app: state.config().source_app.clone(),
    };
    let entry = entry_service::create_manual_entry(store.as_ref(), manual).await?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

/// Correct an entry and move its counters by the difference.
#[utoipa::path(
    put,
    path = "/admin/entries/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token"),
    ("id" = String, Path, description = "Sale entry identifier")),
    request_body = UpdateEntryRequest,
    responses(
        (status = 200, description = "Entry corrected", body = EntryView),
        (status = 404, description = "Unknown entry")
    )
)]
pub async fn update_entry(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<UpdateEntryRequest>>,
) -> Result<Json<EntryView>, AppError> {
    let store = state.require_store().await?;
    let correction = EntryCorrection {
        ticket_count: payload.ticket_count,
        amount_paid: payload.amount.map(to_money).transpose()?,
        name: payload.name,
        email: payload.email,
        phone: payload.phone,
    };
    let entry = entry_service::update_entry(store.as_ref(), &id, correction).await?;
    Ok(Json(entry.into()))
}

/// Delete an entry and withdraw its contribution from the counters.
#[utoipa::path(
    delete,
    path = "/admin/entries/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token"),
    ("id" = String, Path, description = "Sale entry identifier")),
    responses(
        (status = 204, description = "Entry deleted"),
        (status = 404, description = "Unknown entry")
    )
)]
pub async fn delete_entry(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let store = state.require_store().await?;
    entry_service::delete_entry(store.as_ref(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-attribute entries to another referrer.
#[utoipa::path(
    post,
    path = "/admin/entries/transfer",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token")),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer committed", body = TransferResponse),
        (status = 404, description = "Unknown entry or referral code")
    )
)]
pub async fn transfer_entries(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<TransferRequest>>,
) -> Result<Json<TransferResponse>, AppError> {
    let store = state.require_store().await?;
    let report =
        attribution::transfer_attribution(store.as_ref(), &payload.entry_ids, &payload.target_code)
            .await?;
    Ok(Json(report.into()))
}

/// Global counters per category.
#[utoipa::path(
    get,
    path = "/admin/totals",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token")),
    responses((status = 200, description = "Global totals", body = TotalsResponse))
)]
pub async fn get_totals(State(state): State<SharedState>) -> Result<Json<TotalsResponse>, AppError> {
    let store = state.require_store().await?;
    Ok(Json(entry_service::get_totals(store.as_ref()).await?.into()))
}

/// Rebuild every counter from the sale facts.
#[utoipa::path(
    post,
    path = "/admin/totals/recalculate",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token")),
    responses((status = 200, description = "Counters overwritten", body = RecalculateResponse))
)]
pub async fn recalculate_totals(
    State(state): State<SharedState>,
) -> Result<Json<RecalculateResponse>, AppError> {
    let store = state.require_store().await?;
    Ok(Json(recalculation::recalculate_all(store.as_ref()).await?.into()))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    match state.config().admin_token.as_deref() {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized("admin token not configured".into())),
    }
}
