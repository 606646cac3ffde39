/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// Dashmap-backed in-memory backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::{collections::BTreeMap, time::SystemTime};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            CounterKey, InsertOutcome, IntentCompletion, PaymentIntentEntity, ReferrerEntity,
            SaleEntryEntity, Tally, TicketEntity,
        },
        storage::StorageResult,
    },
    state::sale::EntryType,
};

/// Capabilities the raffle core needs from a document store.
///
/// Every backend must provide an atomic insert-if-absent on a document key and an atomic
/// in-place increment for counters; nothing else is assumed to be transactional.
pub trait RaffleStore: Send + Sync {
    /// Create the ticket record only if its number is free.
    fn insert_ticket(&self, ticket: TicketEntity) -> BoxFuture<'static, StorageResult<InsertOutcome>>;
    /// Load the ticket record at `number`.
    fn find_ticket(&self, number: u32) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>>;
    /// Delete the record at `number` if it is still a reservation. Returns whether it was removed.
    fn delete_reservation(&self, number: u32) -> BoxFuture<'static, StorageResult<bool>>;
    /// Create-or-merge the ticket into a terminal status.
    ///
    /// Works whether or not the reservation still exists. Returns `false` when the record was
    /// already terminal, in which case nothing is written.
    fn settle_ticket(&self, ticket: TicketEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// Bulk-delete reservations created strictly before `cutoff`. Returns the number removed.
    fn delete_expired_reservations(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>>;

    /// Create or overwrite the local intent record.
    fn insert_intent(&self, intent: PaymentIntentEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load an intent by gateway id.
    fn find_intent(
        &self,
        id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentIntentEntity>>>;
    /// Flip the intent to `succeeded` and set the idempotency guard, only if the guard is unset.
    /// Returns whether this call performed the flip.
    fn complete_intent(
        &self,
        id: String,
        completion: IntentCompletion,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Succeeded intents of one category (donations are their own sale record).
    fn list_succeeded_intents(
        &self,
        entry_type: EntryType,
    ) -> BoxFuture<'static, StorageResult<Vec<PaymentIntentEntity>>>;

    /// Create the sale entry only if its id is unused.
    fn insert_entry(&self, entry: SaleEntryEntity) -> BoxFuture<'static, StorageResult<InsertOutcome>>;
    /// Load one sale entry.
    fn find_entry(&self, id: String) -> BoxFuture<'static, StorageResult<Option<SaleEntryEntity>>>;
    /// Load the entries among `ids` that exist.
    fn find_entries(
        &self,
        ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<SaleEntryEntity>>>;
    /// Overwrite an existing entry. Returns `false` when it does not exist.
    fn replace_entry(&self, entry: SaleEntryEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// Delete an entry. Returns whether it existed.
    fn delete_entry(&self, id: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Every sale entry.
    fn list_entries(&self) -> BoxFuture<'static, StorageResult<Vec<SaleEntryEntity>>>;

    /// Create the referrer only if its referral code is unused.
    fn insert_referrer(
        &self,
        referrer: ReferrerEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome>>;
    /// Load a referrer by id.
    fn find_referrer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ReferrerEntity>>>;
    /// Load the referrer owning `code`.
    fn find_referrer_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<ReferrerEntity>>>;
    /// Every referrer.
    fn list_referrers(&self) -> BoxFuture<'static, StorageResult<Vec<ReferrerEntity>>>;
    /// Atomically bump the click counter. Returns `false` for an unknown code.
    fn record_referrer_click(&self, code: String) -> BoxFuture<'static, StorageResult<bool>>;

    /// Atomically add `delta` to the counter pair at `key`.
    fn apply_delta(&self, key: CounterKey, delta: Tally) -> BoxFuture<'static, StorageResult<()>>;
    /// Every global counter pair.
    fn global_totals(&self) -> BoxFuture<'static, StorageResult<BTreeMap<EntryType, Tally>>>;
    /// Overwrite one global counter pair.
    fn set_global_totals(
        &self,
        entry_type: EntryType,
        tally: Tally,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Overwrite every counter of one referrer, including the combined amount.
    /// Returns `false` when the referrer does not exist.
    fn set_referrer_totals(
        &self,
        id: Uuid,
        totals: BTreeMap<EntryType, Tally>,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Cheap liveness check of the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
