//! Atomic counter maintenance for global and per-referrer totals.
//!
//! Deltas must already be whole cents; nothing here rounds.

use indexmap::IndexMap;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        models::{CounterKey, Tally},
        raffle_store::RaffleStore,
    },
    error::ServiceError,
    state::sale::EntryType,
};

/// Apply one signed delta in place. Zero deltas are skipped.
pub async fn apply_delta(
    store: &dyn RaffleStore,
    key: CounterKey,
    delta: Tally,
) -> Result<(), ServiceError> {
    if delta.is_zero() {
        return Ok(());
    }
    store.apply_delta(key, delta).await?;
    debug!(?key, tickets = delta.tickets, amount = %delta.amount, "counter delta applied");
    Ok(())
}

/// Credit a sale to its category's global counter and, when attributed, to the referrer.
pub async fn credit(
    store: &dyn RaffleStore,
    entry_type: EntryType,
    referrer_id: Option<Uuid>,
    delta: Tally,
) -> Result<(), ServiceError> {
    apply_delta(store, CounterKey::Global(entry_type), delta).await?;
    if let Some(id) = referrer_id {
        apply_delta(store, CounterKey::Referrer { id, entry_type }, delta).await?;
    }
    Ok(())
}

/// Deltas gathered across a batch, one per counter, in first-touched order.
#[derive(Debug, Default)]
pub struct PendingDeltas {
    deltas: IndexMap<CounterKey, Tally>,
}

impl PendingDeltas {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the pending change for `key`.
    pub fn add(&mut self, key: CounterKey, delta: Tally) {
        *self.deltas.entry(key).or_default() += delta;
    }

    /// Pending change for `key`, zero when none.
    pub fn get(&self, key: &CounterKey) -> Tally {
        self.deltas.get(key).copied().unwrap_or_default()
    }

    /// Apply every non-zero delta; returns how many counters moved.
    pub async fn commit(self, store: &dyn RaffleStore) -> Result<usize, ServiceError> {
        let mut applied = 0;
        for (key, delta) in self.deltas {
            if delta.is_zero() {
                continue;
            }
            apply_delta(store, key, delta).await?;
            applied += 1;
        }
        Ok(applied)
    }
}
