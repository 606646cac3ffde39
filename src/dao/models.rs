use std::{
    collections::BTreeMap,
    ops::{Add, AddAssign, Neg, Sub},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{
    intent::IntentStatus,
    sale::{EntryType, Money, PurchaserInfo, SaleTerms},
};

/// Lifecycle of a numbered ticket record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Held for a buyer pending payment; reclaimed by the sweeper after the timeout.
    Reserved,
    /// Paid through the gateway.
    Paid,
    /// Claimed manually (cash sale, prize assignment).
    Claimed,
    /// Migrated from a legacy shape.
    Converted,
}

impl TicketStatus {
    /// Terminal statuses are never swept.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TicketStatus::Reserved)
    }

    /// Stored tag, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Reserved => "reserved",
            TicketStatus::Paid => "paid",
            TicketStatus::Claimed => "claimed",
            TicketStatus::Converted => "converted",
        }
    }
}

/// Record occupying one key of the bounded ticket-number keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEntity {
    /// Ticket number in `1..=N`, the primary key.
    pub number: u32,
    /// Current lifecycle status.
    pub status: TicketStatus,
    /// Set once at reservation; drives expiry.
    pub created_at: SystemTime,
    /// Purchaser name.
    pub name: String,
    /// Purchaser email.
    pub email: String,
    /// Purchaser phone.
    pub phone: Option<String>,
    /// Fee-excluded amount attributed to this ticket.
    pub amount_paid: Money,
    /// Referral code given at purchase.
    pub referral_code: Option<String>,
    /// Referrer credited, once resolved.
    pub referrer_id: Option<Uuid>,
    /// Intent that paid for the ticket, once known.
    pub intent_id: Option<String>,
}

impl TicketEntity {
    /// Fresh reservation for `number`.
    pub fn reserved(number: u32, purchaser: &PurchaserInfo, created_at: SystemTime) -> Self {
        Self {
            number,
            status: TicketStatus::Reserved,
            created_at,
            name: purchaser.name.clone(),
            email: purchaser.email.clone(),
            phone: purchaser.phone.clone(),
            amount_paid: Money::ZERO,
            referral_code: None,
            referrer_id: None,
            intent_id: None,
        }
    }
}

/// Outcome of a conditional ticket insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was free and now holds the new record.
    Inserted,
    /// Another record already occupies the key; nothing was written.
    Occupied,
}

/// Locally persisted payment intent, keyed by the gateway-issued id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentEntity {
    /// Gateway-issued intent id.
    pub id: String,
    /// Lifecycle status.
    pub status: IntentStatus,
    /// Idempotency guard: once true, redeliveries are no-ops.
    pub webhook_processed: bool,
    /// Sale terms fixed at creation.
    pub terms: SaleTerms,
    /// Creation time.
    pub created_at: SystemTime,
    /// Time the success was applied.
    pub succeeded_at: Option<SystemTime>,
    /// Amount reported by the gateway on success (fee-inclusive, informational only).
    pub amount_received: Option<Money>,
    /// Referrer resolved at success time.
    pub referrer_id: Option<Uuid>,
}

impl PaymentIntentEntity {
    /// New record in the `created` status.
    pub fn created(id: String, terms: SaleTerms, created_at: SystemTime) -> Self {
        Self {
            id,
            status: IntentStatus::Created,
            webhook_processed: false,
            terms,
            created_at,
            succeeded_at: None,
            amount_received: None,
            referrer_id: None,
        }
    }
}

/// Fields written when an intent is flipped to `succeeded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentCompletion {
    /// Amount reported by the gateway.
    pub amount_received: Money,
    /// Referrer resolved for the sale.
    pub referrer_id: Option<Uuid>,
    /// Time of the flip.
    pub succeeded_at: SystemTime,
}

/// Immutable fact describing one completed unit of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleEntryEntity {
    /// Deterministic id derived from the intent, or a UUID for manual entries.
    pub id: String,
    /// Sale category.
    pub entry_type: EntryType,
    /// Tickets the entry stands for.
    pub ticket_count: u32,
    /// Fee-excluded amount.
    pub amount_paid: Money,
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
    /// Provenance tag of the application that produced the sale.
    pub source_app: String,
    /// Creation time.
    pub created_at: SystemTime,
}

impl SaleEntryEntity {
    /// Contribution of this entry to its counters.
    pub fn tally(&self) -> Tally {
        Tally::new(i64::from(self.ticket_count), self.amount_paid)
    }
}

/// Pair of running counters: ticket count and fee-excluded amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Ticket count.
    pub tickets: i64,
    /// Fee-excluded amount.
    #[serde(rename = "amount_cents")]
    pub amount: Money,
}

impl Tally {
    /// Empty pair.
    pub const ZERO: Tally = Tally {
        tickets: 0,
        amount: Money::ZERO,
    };

    /// Pair from its parts.
    pub fn new(tickets: i64, amount: Money) -> Self {
        Self { tickets, amount }
    }

    /// Whether both counters are zero.
    pub fn is_zero(&self) -> bool {
        self.tickets == 0 && self.amount == Money::ZERO
    }
}

impl Add for Tally {
    type Output = Tally;

    fn add(self, rhs: Self) -> Self::Output {
        Tally::new(self.tickets + rhs.tickets, self.amount + rhs.amount)
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Tally {
    type Output = Tally;

    fn sub(self, rhs: Self) -> Self::Output {
        Tally::new(self.tickets - rhs.tickets, self.amount - rhs.amount)
    }
}

impl Neg for Tally {
    type Output = Tally;

    fn neg(self) -> Self::Output {
        Tally::new(-self.tickets, -self.amount)
    }
}

/// Referrer credited for the sales carrying its referral code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerEntity {
    /// Referrer id.
    pub id: Uuid,
    /// Full name.
    pub name: String,
    /// Unique short code, e.g. `JaneD`.
    pub referral_code: String,
    /// Per-category counters.
    #[serde(default)]
    pub totals: BTreeMap<EntryType, Tally>,
    /// Sum of every category amount.
    #[serde(default, rename = "total_amount_cents")]
    pub total_amount: Money,
    /// Recorded referral link clicks.
    #[serde(default)]
    pub click_count: u64,
    /// Creation time.
    pub created_at: SystemTime,
}

impl ReferrerEntity {
    /// Counters for one category, zero when never credited.
    pub fn tally(&self, entry_type: EntryType) -> Tally {
        self.totals.get(&entry_type).copied().unwrap_or_default()
    }

    /// Tickets summed over every category.
    pub fn total_tickets(&self) -> i64 {
        self.totals.values().map(|tally| tally.tickets).sum()
    }
}

/// Address of one counter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// Category total over every sale, attributed or not.
    Global(EntryType),
    /// Category total of one referrer; also moves the referrer's combined amount.
    Referrer { id: Uuid, entry_type: EntryType },
}
