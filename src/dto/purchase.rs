//! Payloads of the public purchase endpoint.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

use crate::{
    dto::validation::validate_referral_code,
    services::payment_service::{PurchaseOrder, PurchaseReceipt},
    state::sale::{EntryType, PurchaserInfo},
};

fn default_quantity() -> u32 {
    1
}

/// Request to start a purchase or donation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PurchaseRequest {
    /// Sale category.
    pub entry_type: EntryType,
    /// Number of tickets; ignored for donations and single-slot purchases.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Donated amount in dollars, e.g. `"25.00"`.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    /// Reserve one numbered Rolex ticket.
    #[serde(default)]
    pub single_slot: bool,
    /// Referral code of the referrer to credit, if any.
    #[serde(default)]
    pub referral_code: Option<String>,
    /// Purchaser full name.
    pub name: String,
    /// Purchaser email, used for the receipt.
    pub email: String,
    /// Optional phone number.
    #[serde(default)]
    pub phone: Option<String>,
}

const MAX_NAME_LEN: usize = 120;
const MAX_PHONE_LEN: usize = 32;

fn length_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

impl Validate for PurchaseRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            errors.add(
                "name",
                length_error("name_length", "Name must be 1 to 120 characters"),
            );
        }
        if !self.email.validate_email() {
            errors.add("email", length_error("email", "Email address is not valid"));
        }
        if self
            .phone
            .as_ref()
            .is_some_and(|phone| phone.chars().count() > MAX_PHONE_LEN)
        {
            errors.add(
                "phone",
                length_error("phone_length", "Phone must be at most 32 characters"),
            );
        }
        // Blank codes mean "no referrer".
        if let Some(code) = self.referral_code.as_deref().map(str::trim) {
            if !code.is_empty() {
                if let Err(e) = validate_referral_code(code) {
                    errors.add("referral_code", e);
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl From<PurchaseRequest> for PurchaseOrder {
    fn from(value: PurchaseRequest) -> Self {
        Self {
            entry_type: value.entry_type,
            quantity: value.quantity,
            amount: value.amount,
            single_slot: value.single_slot,
            referral_code: value.referral_code,
            purchaser: PurchaserInfo {
                name: value.name,
                email: value.email,
                phone: value.phone,
            },
        }
    }
}

/// Everything the client needs to confirm the payment.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurchaseResponse {
    /// Secret the client uses to confirm the payment.
    pub client_secret: String,
    /// Gateway intent id.
    pub intent_id: String,
    /// Reserved number for single-slot Rolex purchases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_number: Option<u32>,
}

impl From<PurchaseReceipt> for PurchaseResponse {
    fn from(value: PurchaseReceipt) -> Self {
        Self {
            client_secret: value.client_secret,
            intent_id: value.intent_id,
            ticket_number: value.ticket_number,
        }
    }
}
