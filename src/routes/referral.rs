use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};

use crate::{
    dto::referral::ClickResponse, error::AppError, services::attribution, state::SharedState,
};

#[utoipa::path(
    post,
    path = "/referrals/{code}/click",
    tag = "referrals",
    params(("code" = String, Path, description = "Referral code carried by the shared link")),
    responses(
        (status = 200, description = "Click recorded", body = ClickResponse),
        (status = 404, description = "Unknown referral code")
    )
)]
/// Count one visit through a referrer's link.
pub async fn record_click(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<ClickResponse>, AppError> {
    let store = state.require_store().await?;
    attribution::record_click(store.as_ref(), &code).await?;
    Ok(Json(ClickResponse {
        referral_code: code,
        recorded: true,
    }))
}

/// Configure the referral routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/referrals/{code}/click", post(record_click))
}
