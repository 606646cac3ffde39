//! Turns a succeeded payment intent into durable sale facts and counter deltas.
//!
//! Every write is keyed deterministically by the intent id and guarded by insert-if-absent, so
//! a redelivered webhook that slipped past the processed flag re-inserts nothing and credits
//! nothing twice.

use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            InsertOutcome, IntentCompletion, PaymentIntentEntity, ReferrerEntity,
            SaleEntryEntity, Tally, TicketEntity, TicketStatus,
        },
        raffle_store::RaffleStore,
    },
    error::ServiceError,
    services::accumulator,
    state::sale::EntryType,
};

/// What a materialization run wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Materialized {
    /// Sale entries newly inserted (a donation counts its intent record).
    pub inserted: usize,
    /// Whether the intent itself was already flipped to `succeeded` by this run.
    pub completed: bool,
}

/// Id of the `index`-th (0-based) fanned-out unit of `intent_id`.
pub fn unit_entry_id(intent_id: &str, index: u32) -> String {
    format!("{intent_id}-{:03}", index + 1)
}

/// Sale entries a succeeded intent produces. Donations produce none: the intent is the record.
pub fn plan_entries(
    intent: &PaymentIntentEntity,
    referrer: Option<&ReferrerEntity>,
    at: SystemTime,
) -> Vec<SaleEntryEntity> {
    let terms = &intent.terms;
    let entry = |id: String, ticket_count: u32, amount_paid, ticket_number| SaleEntryEntity {
        id,
        entry_type: terms.entry_type,
        ticket_count,
        amount_paid,
        referral_code: referrer.map(|referrer| referrer.referral_code.clone()),
        referrer_id: referrer.map(|referrer| referrer.id),
        name: terms.purchaser.name.clone(),
        email: terms.purchaser.email.clone(),
        phone: terms.purchaser.phone.clone(),
        ticket_number,
        intent_id: Some(intent.id.clone()),
        source_app: terms.source_app.clone(),
        created_at: at,
    };

    match (terms.entry_type, terms.ticket_number) {
        (EntryType::Donation, _) => Vec::new(),
        (EntryType::RolexRaffle, Some(number)) => {
            vec![entry(intent.id.clone(), 1, terms.base_amount, Some(number))]
        }
        (EntryType::RolexRaffle, None) => terms
            .base_amount
            .split(terms.quantity)
            .into_iter()
            .zip(0..)
            .map(|(share, index)| entry(unit_entry_id(&intent.id, index), 1, share, None))
            .collect(),
        (EntryType::Raffle | EntryType::Manual, _) => {
            vec![entry(intent.id.clone(), terms.quantity, terms.base_amount, None)]
        }
    }
}

/// Apply the effects of a succeeded intent.
///
/// `completion` is only consumed for donations, where flipping the intent is the insert.
pub async fn materialize(
    store: &dyn RaffleStore,
    intent: &PaymentIntentEntity,
    referrer: Option<&ReferrerEntity>,
    completion: IntentCompletion,
) -> Result<Materialized, ServiceError> {
    let terms = &intent.terms;
    let referrer_id: Option<Uuid> = referrer.map(|referrer| referrer.id);

    if terms.entry_type == EntryType::Donation {
        let flipped = store.complete_intent(intent.id.clone(), completion).await?;
        if flipped {
            accumulator::credit(
                store,
                EntryType::Donation,
                referrer_id,
                Tally::new(1, terms.base_amount),
            )
            .await?;
            info!(intent_id = %intent.id, amount = %terms.base_amount, "donation recorded");
        }
        return Ok(Materialized {
            inserted: usize::from(flipped),
            completed: true,
        });
    }

    if let Some(number) = terms.ticket_number {
        settle_slot(store, intent, referrer, number, completion.succeeded_at).await?;
    }

    let mut outcome = Materialized::default();
    for entry in plan_entries(intent, referrer, completion.succeeded_at) {
        let tally = entry.tally();
        let (entry_id, entry_type) = (entry.id.clone(), entry.entry_type);
        match store.insert_entry(entry).await? {
            InsertOutcome::Inserted => {
                accumulator::credit(store, entry_type, referrer_id, tally).await?;
                outcome.inserted += 1;
            }
            InsertOutcome::Occupied => {
                info!(entry_id = %entry_id, "sale entry already materialized");
            }
        }
    }

    info!(
        intent_id = %intent.id,
        entry_type = %terms.entry_type,
        inserted = outcome.inserted,
        referrer = ?referrer.map(|referrer| &referrer.referral_code),
        "sale materialized"
    );
    Ok(outcome)
}

/// Create-or-merge the reserved number into `paid`, whether or not the sweeper got there first.
async fn settle_slot(
    store: &dyn RaffleStore,
    intent: &PaymentIntentEntity,
    referrer: Option<&ReferrerEntity>,
    number: u32,
    at: SystemTime,
) -> Result<(), ServiceError> {
    let terms = &intent.terms;
    let mut ticket = TicketEntity::reserved(number, &terms.purchaser, at);
    ticket.status = TicketStatus::Paid;
    ticket.amount_paid = terms.base_amount;
    ticket.referral_code = referrer.map(|referrer| referrer.referral_code.clone());
    ticket.referrer_id = referrer.map(|referrer| referrer.id);
    ticket.intent_id = Some(intent.id.clone());

    if store.settle_ticket(ticket).await? {
        info!(ticket = number, intent_id = %intent.id, "ticket paid");
    } else {
        warn!(
            ticket = number,
            intent_id = %intent.id,
            "ticket already terminal; leaving it untouched"
        );
    }
    Ok(())
}
