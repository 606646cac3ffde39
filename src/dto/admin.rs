//! DTO definitions used by the admin REST API and documentation layer.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{ReferrerEntity, SaleEntryEntity, Tally},
    dto::{format_system_time, validation::validate_referral_code},
    services::{attribution::TransferReport, recalculation::RecalcReport},
    state::sale::EntryType,
};

/// Request to register a referrer. Without `referral_code`, one is derived from the name.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReferrerRequest {
    /// Referrer full name.
    pub name: String,
    /// Explicit code; derived from the name when absent.
    #[serde(default)]
    pub referral_code: Option<String>,
}

impl Validate for CreateReferrerRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.trim().is_empty() {
            let mut err = ValidationError::new("name_required");
            err.message = Some("Referrer name is required".into());
            errors.add("name", err);
        }
        // A blank code asks for a derived one.
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

/// Ticket and amount counters of one category.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TallyView {
    /// Ticket count.
    pub tickets: i64,
    /// Fee-excluded amount in dollars.
    #[schema(value_type = String)]
    pub amount: Decimal,
}

impl From<Tally> for TallyView {
    fn from(value: Tally) -> Self {
        Self {
            tickets: value.tickets,
            amount: value.amount.to_decimal(),
        }
    }
}

fn tally_views(totals: BTreeMap<EntryType, Tally>) -> BTreeMap<EntryType, TallyView> {
    totals
        .into_iter()
        .map(|(entry_type, tally)| (entry_type, tally.into()))
        .collect()
}

/// Referrer projection with its cached totals.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReferrerView {
    /// Referrer id.
    pub id: Uuid,
    /// Full name.
    pub name: String,
    /// Unique referral code.
    pub referral_code: String,
    /// Per-category counters.
    #[schema(value_type = Object)]
    pub totals: BTreeMap<EntryType, TallyView>,
    /// Tickets across every category.
    pub total_tickets: i64,
    /// Amount across every category, in dollars.
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    /// Recorded referral link clicks.
    pub click_count: u64,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<ReferrerEntity> for ReferrerView {
    fn from(value: ReferrerEntity) -> Self {
        let total_tickets = value.total_tickets();
        Self {
            id: value.id,
            name: value.name,
            referral_code: value.referral_code,
            totals: tally_views(value.totals),
            total_tickets,
            total_amount: value.total_amount.to_decimal(),
            click_count: value.click_count,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Cash or comp sale recorded by an administrator.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ManualEntryRequest {
    /// Number of tickets the entry stands for.
    #[validate(range(min = 1))]
    pub ticket_count: u32,
    /// Fee-excluded amount in dollars.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Purchaser full name.
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    /// Purchaser email.
    #[validate(email)]
    pub email: String,
    /// Optional phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Referral code to credit, if any.
    #[serde(default)]
    pub referral_code: Option<String>,
}

/// Correction of an existing sale entry. Omitted fields are kept.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateEntryRequest {
    /// New ticket count.
    #[serde(default)]
    pub ticket_count: Option<u32>,
    /// New fee-excluded amount in dollars.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    /// Corrected purchaser name.
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    /// Corrected purchaser email.
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    /// Corrected phone number.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Sale entry as stored.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EntryView {
    /// Entry id.
    pub id: String,
    /// Sale category.
    pub entry_type: EntryType,
    /// Tickets the entry stands for.
    pub ticket_count: u32,
    /// Fee-excluded amount in dollars.
    #[schema(value_type = String)]
    pub amount_paid: Decimal,
    /// Referral code credited.
    pub referral_code: Option<String>,
    /// Referrer credited.
    pub referrer_id: Option<Uuid>,
    /// Purchaser name.
    pub name: String,
    /// Purchaser email.
    pub email: String,
    /// Purchaser phone.
    pub phone: Option<String>,
    /// Ticket number for single-slot sales.
    pub ticket_number: Option<u32>,
    /// Intent that produced the entry.
    pub intent_id: Option<String>,
    /// Provenance tag.
    pub source_app: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<SaleEntryEntity> for EntryView {
    fn from(value: SaleEntryEntity) -> Self {
        Self {
            id: value.id,
            entry_type: value.entry_type,
            ticket_count: value.ticket_count,
            amount_paid: value.amount_paid.to_decimal(),
            referral_code: value.referral_code,
            referrer_id: value.referrer_id,
            name: value.name,
            email: value.email,
            phone: value.phone,
            ticket_number: value.ticket_number,
            intent_id: value.intent_id,
            source_app: value.source_app,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Move the listed entries to the referrer owning `target_code`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TransferRequest {
    /// Entries to move.
    #[validate(length(min = 1))]
    pub entry_ids: Vec<String>,
    /// Referral code of the new owner.
    #[validate(length(min = 1))]
    pub target_code: String,
}

/// Result of a bulk attribution transfer.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferResponse {
    /// Entries rewritten.
    pub entries_moved: usize,
    /// Tickets moved to the target.
    pub tickets_moved: i64,
    /// Amount moved to the target, in dollars.
    #[schema(value_type = String)]
    pub amount_moved: Decimal,
}

impl From<TransferReport> for TransferResponse {
    fn from(value: TransferReport) -> Self {
        Self {
            entries_moved: value.entries_moved,
            tickets_moved: value.tickets_moved,
            amount_moved: value.amount_moved.to_decimal(),
        }
    }
}

/// Result of a full recalculation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecalculateResponse {
    /// Counters overwritten.
    pub updated_count: usize,
    /// Sale entries read.
    pub entries_scanned: usize,
    /// Succeeded donation intents read.
    pub donations_scanned: usize,
}

impl From<RecalcReport> for RecalculateResponse {
    fn from(value: RecalcReport) -> Self {
        Self {
            updated_count: value.updated_count,
            entries_scanned: value.entries_scanned,
            donations_scanned: value.donations_scanned,
        }
    }
}

/// Global counters per category.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TotalsResponse {
    /// Global counters per category.
    #[schema(value_type = Object)]
    pub totals: BTreeMap<EntryType, TallyView>,
}

impl From<BTreeMap<EntryType, Tally>> for TotalsResponse {
    fn from(value: BTreeMap<EntryType, Tally>) -> Self {
        Self {
            totals: tally_views(value),
        }
    }
}
