use std::collections::BTreeMap;

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{
        PaymentIntentEntity, ReferrerEntity, SaleEntryEntity, Tally, TicketEntity, TicketStatus,
    },
    state::{
        intent::IntentStatus,
        sale::{EntryType, Money, SaleTerms},
    },
};

pub const TICKET_COLLECTION_NAME: &str = "tickets";
pub const INTENT_COLLECTION_NAME: &str = "payment_intents";
pub const ENTRY_COLLECTION_NAME: &str = "sale_entries";
pub const REFERRER_COLLECTION_NAME: &str = "referrers";
pub const COUNTER_COLLECTION_NAME: &str = "counters";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTicketDocument {
    #[serde(rename = "_id")]
    pub number: i64,
    pub status: TicketStatus,
    pub created_at: DateTime,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub amount_paid: Money,
    pub referral_code: Option<String>,
    pub referrer_id: Option<String>,
    pub intent_id: Option<String>,
}

impl From<TicketEntity> for MongoTicketDocument {
    fn from(value: TicketEntity) -> Self {
        Self {
            number: i64::from(value.number),
            status: value.status,
            created_at: DateTime::from_system_time(value.created_at),
            name: value.name,
            email: value.email,
            phone: value.phone,
            amount_paid: value.amount_paid,
            referral_code: value.referral_code,
            referrer_id: value.referrer_id.map(|id| id.to_string()),
            intent_id: value.intent_id,
        }
    }
}

impl TryFrom<MongoTicketDocument> for TicketEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTicketDocument) -> Result<Self, Self::Error> {
        let number = u32::try_from(value.number).map_err(|_| MongoDaoError::MalformedDocument {
            collection: TICKET_COLLECTION_NAME,
            id: value.number.to_string(),
            reason: "ticket number out of range".into(),
        })?;
        Ok(Self {
            number,
            status: value.status,
            created_at: value.created_at.to_system_time(),
            name: value.name,
            email: value.email,
            phone: value.phone,
            amount_paid: value.amount_paid,
            referral_code: value.referral_code,
            referrer_id: parse_optional_uuid(TICKET_COLLECTION_NAME, value.referrer_id)?,
            intent_id: value.intent_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoIntentDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: IntentStatus,
    pub webhook_processed: bool,
    pub terms: SaleTerms,
    pub created_at: DateTime,
    pub succeeded_at: Option<DateTime>,
    pub amount_received: Option<Money>,
    pub referrer_id: Option<String>,
}

impl From<PaymentIntentEntity> for MongoIntentDocument {
    fn from(value: PaymentIntentEntity) -> Self {
        Self {
            id: value.id,
            status: value.status,
            webhook_processed: value.webhook_processed,
            terms: value.terms,
            created_at: DateTime::from_system_time(value.created_at),
            succeeded_at: value.succeeded_at.map(DateTime::from_system_time),
            amount_received: value.amount_received,
            referrer_id: value.referrer_id.map(|id| id.to_string()),
        }
    }
}

impl TryFrom<MongoIntentDocument> for PaymentIntentEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoIntentDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            referrer_id: parse_optional_uuid(INTENT_COLLECTION_NAME, value.referrer_id)?,
            id: value.id,
            status: value.status,
            webhook_processed: value.webhook_processed,
            terms: value.terms,
            created_at: value.created_at.to_system_time(),
            succeeded_at: value.succeeded_at.map(|at| at.to_system_time()),
            amount_received: value.amount_received,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEntryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub entry_type: EntryType,
    pub ticket_count: i64,
    pub amount_paid: Money,
    pub referral_code: Option<String>,
    pub referrer_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub ticket_number: Option<i64>,
    pub intent_id: Option<String>,
    pub source_app: String,
    pub created_at: DateTime,
}

impl From<SaleEntryEntity> for MongoEntryDocument {
    fn from(value: SaleEntryEntity) -> Self {
        Self {
            id: value.id,
            entry_type: value.entry_type,
            ticket_count: i64::from(value.ticket_count),
            amount_paid: value.amount_paid,
            referral_code: value.referral_code,
            referrer_id: value.referrer_id.map(|id| id.to_string()),
            name: value.name,
            email: value.email,
            phone: value.phone,
            ticket_number: value.ticket_number.map(i64::from),
            intent_id: value.intent_id,
            source_app: value.source_app,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoEntryDocument> for SaleEntryEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoEntryDocument) -> Result<Self, Self::Error> {
        let malformed = |reason: &str| MongoDaoError::MalformedDocument {
            collection: ENTRY_COLLECTION_NAME,
            id: value.id.clone(),
            reason: reason.to_owned(),
        };
        let ticket_count =
            u32::try_from(value.ticket_count).map_err(|_| malformed("negative ticket count"))?;
        let ticket_number = value
            .ticket_number
            .map(u32::try_from)
            .transpose()
            .map_err(|_| malformed("ticket number out of range"))?;
        Ok(Self {
            referrer_id: parse_optional_uuid(ENTRY_COLLECTION_NAME, value.referrer_id)?,
            id: value.id,
            entry_type: value.entry_type,
            ticket_count,
            amount_paid: value.amount_paid,
            referral_code: value.referral_code,
            name: value.name,
            email: value.email,
            phone: value.phone,
            ticket_number,
            intent_id: value.intent_id,
            source_app: value.source_app,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoReferrerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub referral_code: String,
    #[serde(default)]
    pub totals: BTreeMap<String, Tally>,
    #[serde(default)]
    pub total_amount_cents: Money,
    #[serde(default)]
    pub click_count: i64,
    pub created_at: DateTime,
}

impl From<ReferrerEntity> for MongoReferrerDocument {
    fn from(value: ReferrerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name,
            referral_code: value.referral_code,
            totals: value
                .totals
                .into_iter()
                .map(|(entry_type, tally)| (entry_type.as_str().to_owned(), tally))
                .collect(),
            total_amount_cents: value.total_amount,
            click_count: i64::try_from(value.click_count).unwrap_or(i64::MAX),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoReferrerDocument> for ReferrerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoReferrerDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|err| MongoDaoError::MalformedDocument {
            collection: REFERRER_COLLECTION_NAME,
            id: value.id.clone(),
            reason: err.to_string(),
        })?;
        // Categories this build does not know about are left out of the projection.
        let totals = value
            .totals
            .into_iter()
            .filter_map(|(key, tally)| key.parse::<EntryType>().ok().map(|kind| (kind, tally)))
            .collect();
        Ok(Self {
            id,
            name: value.name,
            referral_code: value.referral_code,
            totals,
            total_amount: value.total_amount_cents,
            click_count: u64::try_from(value.click_count).unwrap_or_default(),
            created_at: value.created_at.to_system_time(),
        })
    }
}

/// Global per-category counter pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCounterDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub entry_type: EntryType,
    #[serde(default)]
    pub tickets: i64,
    #[serde(default)]
    pub amount_cents: Money,
}

/// Nested `totals` sub-document written when overwriting a referrer's counters.
pub fn totals_document(totals: &BTreeMap<EntryType, Tally>) -> Document {
    let mut document = Document::new();
    for (entry_type, tally) in totals {
        document.insert(
            entry_type.as_str(),
            doc! { "tickets": tally.tickets, "amount_cents": tally.amount.cents() },
        );
    }
    document
}

fn parse_optional_uuid(
    collection: &'static str,
    value: Option<String>,
) -> Result<Option<Uuid>, MongoDaoError> {
    value
        .map(|raw| {
            Uuid::parse_str(&raw).map_err(|err| MongoDaoError::MalformedDocument {
                collection,
                id: raw.clone(),
                reason: err.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::state::sale::PurchaserInfo;

    fn at_millis(millis: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(millis)
    }

    #[test]
    fn ticket_documents_key_on_the_number() {
        let purchaser = PurchaserInfo {
            name: "Sam Buyer".into(),
            email: "sam@example.org".into(),
            phone: None,
        };
        let ticket = TicketEntity::reserved(7, &purchaser, at_millis(1_700_000_000_123));
        let document = MongoTicketDocument::from(ticket.clone());
        assert_eq!(document.number, 7);
        assert_eq!(TicketEntity::try_from(document).unwrap(), ticket);
    }

    #[test]
    fn negative_ticket_numbers_are_malformed() {
        let purchaser = PurchaserInfo {
            name: "Sam Buyer".into(),
            email: "sam@example.org".into(),
            phone: None,
        };
        let mut document =
            MongoTicketDocument::from(TicketEntity::reserved(1, &purchaser, at_millis(0)));
        document.number = -1;
        assert!(matches!(
            TicketEntity::try_from(document),
            Err(MongoDaoError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn referrer_totals_are_keyed_by_category_tag() {
        let referrer = ReferrerEntity {
            id: Uuid::new_v4(),
            name: "Jane Doe".into(),
            referral_code: "JaneD".into(),
            totals: BTreeMap::from([(
                EntryType::RolexRaffle,
                Tally::new(2, Money::from_cents(20000)),
            )]),
            total_amount: Money::from_cents(20000),
            click_count: 4,
            created_at: at_millis(1_700_000_000_000),
        };
        let document = MongoReferrerDocument::from(referrer.clone());
        assert!(document.totals.contains_key("rolex_raffle"));
        let nested = totals_document(&referrer.totals);
        assert_eq!(
            nested
                .get_document("rolex_raffle")
                .unwrap()
                .get_i64("amount_cents")
                .unwrap(),
            20000
        );
        assert_eq!(ReferrerEntity::try_from(document).unwrap(), referrer);
    }
}
