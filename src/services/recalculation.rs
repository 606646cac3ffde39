//! Drift repair: rebuild every aggregate from the sale facts and overwrite the stored counters.

use std::collections::BTreeMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{PaymentIntentEntity, SaleEntryEntity, Tally},
        raffle_store::RaffleStore,
    },
    error::ServiceError,
    state::sale::EntryType,
};

/// Aggregates derived from sale facts alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Totals {
    /// Per-category global counters.
    pub globals: BTreeMap<EntryType, Tally>,
    /// Per-referrer, per-category counters.
    pub referrers: BTreeMap<Uuid, BTreeMap<EntryType, Tally>>,
}

impl Totals {
    fn add(&mut self, entry_type: EntryType, referrer_id: Option<Uuid>, tally: Tally) {
        *self.globals.entry(entry_type).or_default() += tally;
        if let Some(id) = referrer_id {
            *self
                .referrers
                .entry(id)
                .or_default()
                .entry(entry_type)
                .or_default() += tally;
        }
    }
}

/// Sum entries and succeeded donations. Integer cents make the result order-independent.
pub fn compute_totals(entries: &[SaleEntryEntity], donations: &[PaymentIntentEntity]) -> Totals {
    let mut totals = Totals::default();
    for entry in entries {
        totals.add(entry.entry_type, entry.referrer_id, entry.tally());
    }
    for donation in donations {
        totals.add(
            EntryType::Donation,
            donation.referrer_id,
            Tally::new(1, donation.terms.base_amount),
        );
    }
    totals
}

/// Outcome of [`recalculate_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalcReport {
    /// Counter documents overwritten: every global category plus every referrer.
    pub updated_count: usize,
    /// Sale entries read.
    pub entries_scanned: usize,
    /// Succeeded donation intents read.
    pub donations_scanned: usize,
}

/// Recompute and overwrite every global and referrer counter.
///
/// Safe to run while sales are flowing: a sale landing mid-run is either counted in the scan or
/// reapplied by its own delta, and the next run converges.
pub async fn recalculate_all(store: &dyn RaffleStore) -> Result<RecalcReport, ServiceError> {
    let entries = store.list_entries().await?;
    let donations = store.list_succeeded_intents(EntryType::Donation).await?;
    let referrers = store.list_referrers().await?;
    let mut totals = compute_totals(&entries, &donations);

    let mut updated_count = 0;
    for entry_type in EntryType::ALL {
        let tally = totals.globals.get(&entry_type).copied().unwrap_or_default();
        store.set_global_totals(entry_type, tally).await?;
        updated_count += 1;
    }

    for referrer in &referrers {
        let computed = totals.referrers.remove(&referrer.id).unwrap_or_default();
        if store.set_referrer_totals(referrer.id, computed).await? {
            updated_count += 1;
        } else {
            warn!(referrer_id = %referrer.id, "referrer disappeared during recalculation");
        }
    }
    for orphan in totals.referrers.keys() {
        warn!(referrer_id = %orphan, "sales attributed to an unknown referrer");
    }

    let report = RecalcReport {
        updated_count,
        entries_scanned: entries.len(),
        donations_scanned: donations.len(),
    };
    info!(
        updated = report.updated_count,
        entries = report.entries_scanned,
        donations = report.donations_scanned,
        "totals recalculated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{
        dao::{
            models::{CounterKey, SaleEntryEntity},
            raffle_store::memory::MemoryRaffleStore,
        },
        services::attribution::create_referrer,
        state::sale::Money,
    };

    fn entry(id: &str, entry_type: EntryType, tickets: u32, cents: i64, referrer: Option<Uuid>) -> SaleEntryEntity {
        SaleEntryEntity {
            id: id.into(),
            entry_type,
            ticket_count: tickets,
            amount_paid: Money::from_cents(cents),
            referral_code: None,
            referrer_id: referrer,
            name: "Jane Doe".into(),
            email: "jane@example.org".into(),
            phone: None,
            ticket_number: None,
            intent_id: None,
            source_app: "raffle-back".into(),
            created_at: SystemTime::now(),
        }
    }

    #[test]
    fn summation_ignores_order() {
        let referrer = Uuid::new_v4();
        let mut entries = vec![
            entry("a", EntryType::Raffle, 5, 5000, Some(referrer)),
            entry("b", EntryType::Raffle, 1, 1000, None),
            entry("c", EntryType::RolexRaffle, 1, 333, Some(referrer)),
        ];
        let forward = compute_totals(&entries, &[]);
        entries.reverse();
        assert_eq!(compute_totals(&entries, &[]), forward);
        assert_eq!(
            forward.globals[&EntryType::Raffle],
            Tally::new(6, Money::from_cents(6000))
        );
        assert_eq!(
            forward.referrers[&referrer][&EntryType::RolexRaffle],
            Tally::new(1, Money::from_cents(333))
        );
    }

    #[tokio::test]
    async fn drifted_counters_are_overwritten() {
        let store = MemoryRaffleStore::new();
        let jane = create_referrer(&store, "Jane Doe", None).await.unwrap();
        store
            .insert_entry(entry("a", EntryType::Raffle, 5, 5000, Some(jane.id)))
            .await
            .unwrap();

        // Drift: counters credited twice, one stale category.
        for _ in 0..2 {
            store
                .apply_delta(
                    CounterKey::Referrer { id: jane.id, entry_type: EntryType::Raffle },
                    Tally::new(5, Money::from_cents(5000)),
                )
                .await
                .unwrap();
        }
        store
            .apply_delta(
                CounterKey::Global(EntryType::Manual),
                Tally::new(9, Money::from_cents(9)),
            )
            .await
            .unwrap();

        let report = recalculate_all(&store).await.unwrap();
        assert_eq!(report.updated_count, EntryType::ALL.len() + 1);
        assert_eq!(report.entries_scanned, 1);

        let globals = store.global_totals().await.unwrap();
        assert_eq!(globals[&EntryType::Raffle], Tally::new(5, Money::from_cents(5000)));
        assert_eq!(globals.get(&EntryType::Manual).copied().unwrap_or_default(), Tally::ZERO);

        let jane = store.find_referrer(jane.id).await.unwrap().unwrap();
        assert_eq!(jane.tally(EntryType::Raffle), Tally::new(5, Money::from_cents(5000)));
        assert_eq!(jane.total_amount, Money::from_cents(5000));
    }
}
