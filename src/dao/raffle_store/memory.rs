//! In-process store used by tests and by `STORAGE_BACKEND=memory`.
//!
//! Each dashmap shard lock plays the role of the document store's per-key atomicity: inserts go
//! through the entry API so a key is checked and claimed under the same lock.

use std::{collections::BTreeMap, sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            CounterKey, InsertOutcome, IntentCompletion, PaymentIntentEntity, ReferrerEntity,
            SaleEntryEntity, Tally, TicketEntity, TicketStatus,
        },
        raffle_store::RaffleStore,
        storage::StorageResult,
    },
    state::{intent::IntentStatus, sale::EntryType},
};

/// In-process store backed by concurrent maps.
#[derive(Clone, Default)]
pub struct MemoryRaffleStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tickets: DashMap<u32, TicketEntity>,
    intents: DashMap<String, PaymentIntentEntity>,
    entries: DashMap<String, SaleEntryEntity>,
    referrers: DashMap<Uuid, ReferrerEntity>,
    referral_codes: DashMap<String, Uuid>,
    globals: DashMap<EntryType, Tally>,
}

impl MemoryRaffleStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ticket records currently held, any status.
    pub fn ticket_count(&self) -> usize {
        self.inner.tickets.len()
    }

    /// Number of sale entries currently held.
    pub fn entry_count(&self) -> usize {
        self.inner.entries.len()
    }

    fn insert_ticket(&self, ticket: TicketEntity) -> InsertOutcome {
        match self.inner.tickets.entry(ticket.number) {
            Entry::Occupied(_) => InsertOutcome::Occupied,
            Entry::Vacant(slot) => {
                slot.insert(ticket);
                InsertOutcome::Inserted
            }
        }
    }

    fn settle_ticket(&self, ticket: TicketEntity) -> bool {
        match self.inner.tickets.entry(ticket.number) {
            Entry::Occupied(mut existing) => {
                if existing.get().status.is_terminal() {
                    return false;
                }
                let created_at = existing.get().created_at;
                existing.insert(TicketEntity {
                    created_at,
                    ..ticket
                });
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(ticket);
                true
            }
        }
    }

    fn delete_expired(&self, cutoff: SystemTime) -> u64 {
        let mut removed = 0;
        self.inner.tickets.retain(|_, ticket| {
            let expired = ticket.status == TicketStatus::Reserved && ticket.created_at < cutoff;
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    fn complete_intent(&self, id: &str, completion: IntentCompletion) -> bool {
        let Some(mut intent) = self.inner.intents.get_mut(id) else {
            return false;
        };
        if intent.webhook_processed {
            return false;
        }
        intent.status = IntentStatus::Succeeded;
        intent.webhook_processed = true;
        intent.amount_received = Some(completion.amount_received);
        intent.referrer_id = completion.referrer_id;
        intent.succeeded_at = Some(completion.succeeded_at);
        true
    }

    fn insert_referrer(&self, referrer: ReferrerEntity) -> InsertOutcome {
        match self.inner.referral_codes.entry(referrer.referral_code.clone()) {
            Entry::Occupied(_) => InsertOutcome::Occupied,
            Entry::Vacant(slot) => {
                slot.insert(referrer.id);
                self.inner.referrers.insert(referrer.id, referrer);
                InsertOutcome::Inserted
            }
        }
    }

    fn find_referrer_by_code(&self, code: &str) -> Option<ReferrerEntity> {
        let id = *self.inner.referral_codes.get(code)?;
        self.inner.referrers.get(&id).map(|entry| entry.clone())
    }

    fn record_click(&self, code: &str) -> bool {
        let Some(id) = self.inner.referral_codes.get(code).map(|entry| *entry) else {
            return false;
        };
        match self.inner.referrers.get_mut(&id) {
            Some(mut referrer) => {
                referrer.click_count += 1;
                true
            }
            None => false,
        }
    }

    fn apply_delta(&self, key: CounterKey, delta: Tally) {
        match key {
            CounterKey::Global(entry_type) => {
                *self.inner.globals.entry(entry_type).or_default() += delta;
            }
            CounterKey::Referrer { id, entry_type } => {
                if let Some(mut referrer) = self.inner.referrers.get_mut(&id) {
                    *referrer.totals.entry(entry_type).or_default() += delta;
                    referrer.total_amount += delta.amount;
                }
            }
        }
    }

    fn set_referrer_totals(&self, id: Uuid, totals: BTreeMap<EntryType, Tally>) -> bool {
        let Some(mut referrer) = self.inner.referrers.get_mut(&id) else {
            return false;
        };
        referrer.total_amount = totals.values().map(|tally| tally.amount).sum();
        referrer.totals = totals;
        true
    }
}

impl RaffleStore for MemoryRaffleStore {
    fn insert_ticket(&self, ticket: TicketEntity) -> BoxFuture<'static, StorageResult<InsertOutcome>> {
        let outcome = MemoryRaffleStore::insert_ticket(self, ticket);
        Box::pin(async move { Ok(outcome) })
    }

    fn find_ticket(&self, number: u32) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
        let ticket = self.inner.tickets.get(&number).map(|entry| entry.clone());
        Box::pin(async move { Ok(ticket) })
    }

    fn delete_reservation(&self, number: u32) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self
            .inner
            .tickets
            .remove_if(&number, |_, ticket| ticket.status == TicketStatus::Reserved)
            .is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn settle_ticket(&self, ticket: TicketEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let settled = MemoryRaffleStore::settle_ticket(self, ticket);
        Box::pin(async move { Ok(settled) })
    }

    fn delete_expired_reservations(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let removed = self.delete_expired(cutoff);
        Box::pin(async move { Ok(removed) })
    }

    fn insert_intent(&self, intent: PaymentIntentEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.intents.insert(intent.id.clone(), intent);
        Box::pin(async move { Ok(()) })
    }

    fn find_intent(
        &self,
        id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentIntentEntity>>> {
        let intent = self.inner.intents.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(intent) })
    }

    fn complete_intent(
        &self,
        id: String,
        completion: IntentCompletion,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let flipped = MemoryRaffleStore::complete_intent(self, &id, completion);
        Box::pin(async move { Ok(flipped) })
    }

    fn list_succeeded_intents(
        &self,
        entry_type: EntryType,
    ) -> BoxFuture<'static, StorageResult<Vec<PaymentIntentEntity>>> {
        let intents = self
            .inner
            .intents
            .iter()
            .filter(|intent| {
                intent.status == IntentStatus::Succeeded && intent.terms.entry_type == entry_type
            })
            .map(|intent| intent.clone())
            .collect();
        Box::pin(async move { Ok(intents) })
    }

    fn insert_entry(&self, entry: SaleEntryEntity) -> BoxFuture<'static, StorageResult<InsertOutcome>> {
        let outcome = match self.inner.entries.entry(entry.id.clone()) {
            Entry::Occupied(_) => InsertOutcome::Occupied,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                InsertOutcome::Inserted
            }
        };
        Box::pin(async move { Ok(outcome) })
    }

    fn find_entry(&self, id: String) -> BoxFuture<'static, StorageResult<Option<SaleEntryEntity>>> {
        let entry = self.inner.entries.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(entry) })
    }

    fn find_entries(
        &self,
        ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<SaleEntryEntity>>> {
        let entries = ids
            .iter()
            .filter_map(|id| self.inner.entries.get(id).map(|entry| entry.clone()))
            .collect();
        Box::pin(async move { Ok(entries) })
    }

    fn replace_entry(&self, entry: SaleEntryEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let replaced = match self.inner.entries.get_mut(&entry.id) {
            Some(mut existing) => {
                *existing = entry;
                true
            }
            None => false,
        };
        Box::pin(async move { Ok(replaced) })
    }

    fn delete_entry(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.inner.entries.remove(&id).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn list_entries(&self) -> BoxFuture<'static, StorageResult<Vec<SaleEntryEntity>>> {
        let entries = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.clone())
            .collect();
        Box::pin(async move { Ok(entries) })
    }

    fn insert_referrer(
        &self,
        referrer: ReferrerEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome>> {
        let outcome = MemoryRaffleStore::insert_referrer(self, referrer);
        Box::pin(async move { Ok(outcome) })
    }

    fn find_referrer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ReferrerEntity>>> {
        let referrer = self.inner.referrers.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(referrer) })
    }

    fn find_referrer_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<ReferrerEntity>>> {
        let referrer = MemoryRaffleStore::find_referrer_by_code(self, &code);
        Box::pin(async move { Ok(referrer) })
    }

    fn list_referrers(&self) -> BoxFuture<'static, StorageResult<Vec<ReferrerEntity>>> {
        let referrers = self
            .inner
            .referrers
            .iter()
            .map(|entry| entry.clone())
            .collect();
        Box::pin(async move { Ok(referrers) })
    }

    fn record_referrer_click(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let recorded = self.record_click(&code);
        Box::pin(async move { Ok(recorded) })
    }

    fn apply_delta(&self, key: CounterKey, delta: Tally) -> BoxFuture<'static, StorageResult<()>> {
        MemoryRaffleStore::apply_delta(self, key, delta);
        Box::pin(async move { Ok(()) })
    }

    fn global_totals(&self) -> BoxFuture<'static, StorageResult<BTreeMap<EntryType, Tally>>> {
        let totals = self
            .inner
            .globals
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        Box::pin(async move { Ok(totals) })
    }

    fn set_global_totals(
        &self,
        entry_type: EntryType,
        tally: Tally,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.globals.insert(entry_type, tally);
        Box::pin(async move { Ok(()) })
    }

    fn set_referrer_totals(
        &self,
        id: Uuid,
        totals: BTreeMap<EntryType, Tally>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let updated = MemoryRaffleStore::set_referrer_totals(self, id, totals);
        Box::pin(async move { Ok(updated) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::sale::{Money, PurchaserInfo};

    fn purchaser() -> PurchaserInfo {
        PurchaserInfo {
            name: "Jane Doe".into(),
            email: "jane@example.org".into(),
            phone: None,
        }
    }

    #[tokio::test]
    async fn insert_ticket_refuses_occupied_key() {
        let store = MemoryRaffleStore::new();
        let now = SystemTime::now();
        let first = RaffleStore::insert_ticket(&store, TicketEntity::reserved(7, &purchaser(), now))
            .await
            .unwrap();
        let second = RaffleStore::insert_ticket(&store, TicketEntity::reserved(7, &purchaser(), now))
            .await
            .unwrap();
        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Occupied);
        assert_eq!(store.ticket_count(), 1);
    }

    #[tokio::test]
    async fn settle_keeps_creation_time_and_refuses_terminal() {
        let store = MemoryRaffleStore::new();
        let created = SystemTime::now() - Duration::from_secs(60);
        RaffleStore::insert_ticket(&store, TicketEntity::reserved(3, &purchaser(), created))
            .await
            .unwrap();

        let mut paid = TicketEntity::reserved(3, &purchaser(), SystemTime::now());
        paid.status = TicketStatus::Paid;
        paid.amount_paid = Money::from_cents(10_000);
        assert!(RaffleStore::settle_ticket(&store, paid.clone()).await.unwrap());
        assert!(!RaffleStore::settle_ticket(&store, paid).await.unwrap());

        let stored = store.find_ticket(3).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Paid);
        assert_eq!(stored.created_at, created);
    }

    #[tokio::test]
    async fn delete_reservation_leaves_paid_tickets() {
        let store = MemoryRaffleStore::new();
        let mut paid = TicketEntity::reserved(1, &purchaser(), SystemTime::now());
        paid.status = TicketStatus::Paid;
        RaffleStore::insert_ticket(&store, paid).await.unwrap();
        assert!(!store.delete_reservation(1).await.unwrap());
        assert!(!store.delete_reservation(2).await.unwrap());
        assert_eq!(store.ticket_count(), 1);
    }

    #[tokio::test]
    async fn referral_codes_are_unique() {
        let store = MemoryRaffleStore::new();
        let referrer = |name: &str| ReferrerEntity {
            id: Uuid::new_v4(),
            name: name.into(),
            referral_code: "JaneD".into(),
            totals: BTreeMap::new(),
            total_amount: Money::ZERO,
            click_count: 0,
            created_at: SystemTime::now(),
        };
        assert_eq!(
            RaffleStore::insert_referrer(&store, referrer("Jane Doe")).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            RaffleStore::insert_referrer(&store, referrer("Jane Dunn")).await.unwrap(),
            InsertOutcome::Occupied
        );
        assert!(store.record_referrer_click("JaneD".into()).await.unwrap());
        assert!(!store.record_referrer_click("JohnD".into()).await.unwrap());
        let stored = RaffleStore::find_referrer_by_code(&store, "JaneD".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.click_count, 1);
    }
}
