//! Administrative corrections of sale entries, each paired with its compensating delta.

use std::{collections::BTreeMap, time::SystemTime};

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        models::{InsertOutcome, SaleEntryEntity, Tally},
        raffle_store::RaffleStore,
    },
    error::ServiceError,
    services::{accumulator, attribution},
    state::sale::{EntryType, Money, PurchaserInfo},
};

/// Sale recorded outside the payment flow (cash, cheque, comp).
#[derive(Debug, Clone)]
pub struct ManualEntry {
    /// Tickets the entry stands for.
    pub ticket_count: u32,
    /// Fee-excluded amount.
    pub amount_paid: Money,
    /// Buyer contact details.
    pub purchaser: PurchaserInfo,
    /// Referral code to credit, if any.
    pub referral_code: Option<String>,
    /// Provenance tag.
    pub source_app: String,
}

/// Fields an administrator may correct. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct EntryCorrection {
    /// New ticket count.
    pub ticket_count: Option<u32>,
    /// New fee-excluded amount.
    pub amount_paid: Option<Money>,
    /// Corrected name.
    pub name: Option<String>,
    /// Corrected email.
    pub email: Option<String>,
    /// Corrected phone.
    pub phone: Option<String>,
}

fn ensure_non_negative(amount: Money) -> Result<(), ServiceError> {
    if amount.cents() < 0 {
        return Err(ServiceError::InvalidInput("amount must not be negative".into()));
    }
    Ok(())
}

/// Record a sale made outside the payment flow and credit its totals.
pub async fn create_manual_entry(
    store: &dyn RaffleStore,
    manual: ManualEntry,
) -> Result<SaleEntryEntity, ServiceError> {
    ensure_non_negative(manual.amount_paid)?;
    let referrer = attribution::resolve(store, manual.referral_code.as_deref()).await?;
    let entry = SaleEntryEntity {
        id: Uuid::new_v4().to_string(),
        entry_type: EntryType::Manual,
        ticket_count: manual.ticket_count,
        amount_paid: manual.amount_paid,
        referral_code: referrer.as_ref().map(|referrer| referrer.referral_code.clone()),
        referrer_id: referrer.as_ref().map(|referrer| referrer.id),
        name: manual.purchaser.name,
        email: manual.purchaser.email,
        phone: manual.purchaser.phone,
        ticket_number: None,
        intent_id: None,
        source_app: manual.source_app,
        created_at: SystemTime::now(),
    };

    if store.insert_entry(entry.clone()).await? == InsertOutcome::Occupied {
        return Err(ServiceError::Internal(format!("entry id `{}` collided", entry.id)));
    }
    accumulator::credit(store, entry.entry_type, entry.referrer_id, entry.tally()).await?;
    info!(entry_id = %entry.id, tickets = entry.ticket_count, amount = %entry.amount_paid, "manual entry recorded");
    Ok(entry)
}

/// Apply `correction` and move the counters by `new - old`.
pub async fn update_entry(
    store: &dyn RaffleStore,
    id: &str,
    correction: EntryCorrection,
) -> Result<SaleEntryEntity, ServiceError> {
    let existing = store
        .find_entry(id.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("sale entry `{id}`")))?;

    let mut updated = existing.clone();
    if let Some(ticket_count) = correction.ticket_count {
        updated.ticket_count = ticket_count;
    }
    if let Some(amount_paid) = correction.amount_paid {
        ensure_non_negative(amount_paid)?;
        updated.amount_paid = amount_paid;
    }
    if let Some(name) = correction.name {
        updated.name = name;
    }
    if let Some(email) = correction.email {
        updated.email = email;
    }
    if correction.phone.is_some() {
        updated.phone = correction.phone;
    }

    if !store.replace_entry(updated.clone()).await? {
        return Err(ServiceError::NotFound(format!("sale entry `{id}`")));
    }
    let delta: Tally = updated.tally() - existing.tally();
    accumulator::credit(store, updated.entry_type, updated.referrer_id, delta).await?;
    info!(entry_id = id, tickets = delta.tickets, amount = %delta.amount, "entry corrected");
    Ok(updated)
}

/// Remove an entry and withdraw its contribution.
pub async fn delete_entry(store: &dyn RaffleStore, id: &str) -> Result<SaleEntryEntity, ServiceError> {
    let existing = store
        .find_entry(id.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("sale entry `{id}`")))?;
    if !store.delete_entry(id.to_owned()).await? {
        return Err(ServiceError::NotFound(format!("sale entry `{id}`")));
    }
    accumulator::credit(store, existing.entry_type, existing.referrer_id, -existing.tally()).await?;
    info!(entry_id = id, "entry deleted");
    Ok(existing)
}

/// Global counters for every category, zero-filled.
pub async fn get_totals(store: &dyn RaffleStore) -> Result<BTreeMap<EntryType, Tally>, ServiceError> {
    let mut totals = store.global_totals().await?;
    for entry_type in EntryType::ALL {
        totals.entry(entry_type).or_default();
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::raffle_store::memory::MemoryRaffleStore, services::attribution::create_referrer};

    fn manual(tickets: u32, cents: i64, code: Option<&str>) -> ManualEntry {
        ManualEntry {
            ticket_count: tickets,
            amount_paid: Money::from_cents(cents),
            purchaser: PurchaserInfo {
                name: "Walk In".into(),
                email: "walkin@example.org".into(),
                phone: None,
            },
            referral_code: code.map(str::to_owned),
            source_app: "admin".into(),
        }
    }

    #[tokio::test]
    async fn corrections_move_counters_by_the_difference() {
        let store = MemoryRaffleStore::new();
        let jane = create_referrer(&store, "Jane Doe", None).await.unwrap();
        let entry = create_manual_entry(&store, manual(2, 2000, Some("JaneD")))
            .await
            .unwrap();
        assert_eq!(entry.referrer_id, Some(jane.id));

        update_entry(
            &store,
            &entry.id,
            EntryCorrection {
                ticket_count: Some(3),
                amount_paid: Some(Money::from_cents(2500)),
                ..EntryCorrection::default()
            },
        )
        .await
        .unwrap();

        let totals = get_totals(&store).await.unwrap();
        assert_eq!(totals[&EntryType::Manual], Tally::new(3, Money::from_cents(2500)));
        assert_eq!(totals[&EntryType::Raffle], Tally::ZERO);
        let jane = store.find_referrer(jane.id).await.unwrap().unwrap();
        assert_eq!(jane.tally(EntryType::Manual), Tally::new(3, Money::from_cents(2500)));

        delete_entry(&store, &entry.id).await.unwrap();
        let totals = get_totals(&store).await.unwrap();
        assert_eq!(totals[&EntryType::Manual], Tally::ZERO);
        let jane = store.find_referrer(jane.id).await.unwrap().unwrap();
        assert_eq!(jane.total_amount, Money::ZERO);
    }

    #[tokio::test]
    async fn missing_entries_are_not_found() {
        let store = MemoryRaffleStore::new();
        assert!(matches!(
            delete_entry(&store, "nope").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            update_entry(&store, "nope", EntryCorrection::default()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn negative_amounts_are_rejected() {
        let store = MemoryRaffleStore::new();
        assert!(matches!(
            create_manual_entry(&store, manual(1, -100, None)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert_eq!(store.entry_count(), 0);
    }
}
