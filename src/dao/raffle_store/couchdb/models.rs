use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    dao::models::{Tally, TicketEntity, TicketStatus},
    state::sale::{EntryType, Money},
};

pub const TICKET_PREFIX: &str = "ticket::";
pub const INTENT_PREFIX: &str = "intent::";
pub const ENTRY_PREFIX: &str = "entry::";
pub const REFERRER_PREFIX: &str = "referrer::";
pub const REFERRAL_CODE_PREFIX: &str = "referral_code::";
pub const COUNTER_PREFIX: &str = "counter::";
pub const END_SUFFIX: &str = "\u{ffff}";

/// Any stored document: CouchDB metadata plus a flattened body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<B> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: B,
}

impl<B> CouchDocument<B> {
    pub fn new(id: String, rev: Option<String>, body: B) -> Self {
        Self { id, rev, body }
    }
}

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// One page of a Mango `_find` query.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

/// Ticket body; the creation time is kept in epoch milliseconds so Mango can range over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchTicketBody {
    pub number: u32,
    pub status: TicketStatus,
    pub created_at_ms: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub amount_paid: Money,
    pub referral_code: Option<String>,
    pub referrer_id: Option<Uuid>,
    pub intent_id: Option<String>,
}

impl From<TicketEntity> for CouchTicketBody {
    fn from(value: TicketEntity) -> Self {
        Self {
            number: value.number,
            status: value.status,
            created_at_ms: epoch_millis(value.created_at),
            name: value.name,
            email: value.email,
            phone: value.phone,
            amount_paid: value.amount_paid,
            referral_code: value.referral_code,
            referrer_id: value.referrer_id,
            intent_id: value.intent_id,
        }
    }
}

impl From<CouchTicketBody> for TicketEntity {
    fn from(value: CouchTicketBody) -> Self {
        Self {
            number: value.number,
            status: value.status,
            created_at: from_epoch_millis(value.created_at_ms),
            name: value.name,
            email: value.email,
            phone: value.phone,
            amount_paid: value.amount_paid,
            referral_code: value.referral_code,
            referrer_id: value.referrer_id,
            intent_id: value.intent_id,
        }
    }
}

/// Index document mapping a referral code to its referrer; its key enforces code uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchReferralCodeBody {
    pub referrer_id: Uuid,
}

/// Global per-category counter pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchCounterBody {
    pub entry_type: EntryType,
    #[serde(flatten)]
    pub tally: Tally,
}

pub fn ticket_doc_id(number: u32) -> String {
    format!("{TICKET_PREFIX}{number}")
}

pub fn intent_doc_id(id: &str) -> String {
    format!("{INTENT_PREFIX}{id}")
}

pub fn entry_doc_id(id: &str) -> String {
    format!("{ENTRY_PREFIX}{id}")
}

pub fn referrer_doc_id(id: Uuid) -> String {
    format!("{REFERRER_PREFIX}{id}")
}

pub fn referral_code_doc_id(code: &str) -> String {
    format!("{REFERRAL_CODE_PREFIX}{code}")
}

pub fn counter_doc_id(entry_type: EntryType) -> String {
    format!("{COUNTER_PREFIX}{}", entry_type.counter_id())
}

pub fn epoch_millis(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

fn from_epoch_millis(millis: i64) -> SystemTime {
    let offset = Duration::from_millis(millis.unsigned_abs());
    if millis >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}
