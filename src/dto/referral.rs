use serde::Serialize;
use utoipa::ToSchema;

/// Response to a recorded referral link click.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClickResponse {
    /// Code the click was recorded for.
    pub referral_code: String,
    /// Always `true` once the counter was bumped.
    pub recorded: bool,
}
