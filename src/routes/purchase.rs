use axum::{Json, Router, extract::State, routing::post};
use axum_valid::Valid;

use crate::{
    dto::purchase::{PurchaseRequest, PurchaseResponse},
    error::AppError,
    services::payment_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/purchases",
    tag = "purchases",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Payment intent created", body = PurchaseResponse),
        (status = 400, description = "Invalid purchase request"),
        (status = 409, description = "No ticket number left"),
        (status = 502, description = "Payment gateway failure"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Start a purchase: reserve a number when asked and mint the payment intent.
pub async fn create_purchase(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PurchaseRequest>>,
) -> Result<Json<PurchaseResponse>, AppError> {
    let receipt = payment_service::reserve_and_pay(&state, payload.into()).await?;
    Ok(Json(receipt.into()))
}

/// Configure the purchase routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/purchases", post(create_purchase))
}
