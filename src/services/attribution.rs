//! Referral codes, referrer resolution and bulk re-attribution of sale entries.

use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{CounterKey, InsertOutcome, ReferrerEntity, SaleEntryEntity},
        raffle_store::RaffleStore,
    },
    dto::validation::{MAX_REFERRAL_CODE_LEN, validate_referral_code},
    error::ServiceError,
    services::accumulator::PendingDeltas,
    state::sale::Money,
};

/// Trailing letter used when a name has no last name.
const PLACEHOLDER_INITIAL: char = 'X';

/// Derive a referral code from a full name: first name plus the uppercase last-name initial.
///
/// `"Jane Doe"` becomes `JaneD`, `"Cher"` becomes `CherX`, `"Anne-Marie Smith"` becomes
/// `AnneMarieS`. Only ASCII letters and digits are kept so the code is accepted at checkout.
/// Returns `None` when fewer than two usable characters remain.
pub fn derive_referral_code(full_name: &str) -> Option<String> {
    let mut words = full_name.split_whitespace();
    let first: String = words
        .next()?
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_REFERRAL_CODE_LEN - 1)
        .collect();
    let initial = words
        .last()
        .and_then(|last| last.chars().find(char::is_ascii_alphanumeric))
        .map(|letter| letter.to_ascii_uppercase())
        .unwrap_or(PLACEHOLDER_INITIAL);
    if first.is_empty() {
        return None;
    }
    Some(format!("{first}{initial}"))
}

/// Register a referrer. An explicit code takes precedence over the derived one.
pub async fn create_referrer(
    store: &dyn RaffleStore,
    name: &str,
    explicit_code: Option<&str>,
) -> Result<ReferrerEntity, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("referrer name is required".into()));
    }
    let code = match explicit_code.map(str::trim).filter(|code| !code.is_empty()) {
        Some(code) => code.to_owned(),
        None => derive_referral_code(name).ok_or_else(|| {
            ServiceError::InvalidInput(
                "cannot derive a referral code from this name; provide one explicitly".into(),
            )
        })?,
    };
    validate_referral_code(&code)
        .map_err(|err| ServiceError::InvalidInput(format!("referral code `{code}`: {err}")))?;

    let referrer = ReferrerEntity {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        referral_code: code.clone(),
        totals: Default::default(),
        total_amount: Money::ZERO,
        click_count: 0,
        created_at: SystemTime::now(),
    };
    match store.insert_referrer(referrer.clone()).await? {
        InsertOutcome::Inserted => {
            info!(referrer_id = %referrer.id, code = %code, "referrer created");
            Ok(referrer)
        }
        InsertOutcome::Occupied => Err(ServiceError::InvalidInput(format!(
            "referral code `{code}` is already taken"
        ))),
    }
}

/// Look up the referrer owning `code`. Unknown or absent codes leave the sale unattributed.
pub async fn resolve(
    store: &dyn RaffleStore,
    code: Option<&str>,
) -> Result<Option<ReferrerEntity>, ServiceError> {
    let Some(code) = code.filter(|code| !code.is_empty()) else {
        return Ok(None);
    };
    let referrer = store.find_referrer_by_code(code.to_owned()).await?;
    if referrer.is_none() {
        info!(code, "referral code has no match; sale stays unattributed");
    }
    Ok(referrer)
}

/// Count one click on the referral link of `code`.
pub async fn record_click(store: &dyn RaffleStore, code: &str) -> Result<(), ServiceError> {
    if store.record_referrer_click(code.to_owned()).await? {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!("referral code `{code}`")))
    }
}

/// Every referrer, sorted by code.
pub async fn list_referrers(store: &dyn RaffleStore) -> Result<Vec<ReferrerEntity>, ServiceError> {
    let mut referrers = store.list_referrers().await?;
    referrers.sort_by(|left, right| left.referral_code.cmp(&right.referral_code));
    Ok(referrers)
}

/// Result of a bulk transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Entries rewritten.
    pub entries_moved: usize,
    /// Tickets moved to the target.
    pub tickets_moved: i64,
    /// Amount moved to the target.
    pub amount_moved: Money,
}

/// Re-attribute `entry_ids` to the referrer owning `target_code`.
///
/// Entries already attributed to the target are skipped. Every id must exist; a missing one
/// fails the whole call before anything is written.
pub async fn transfer_attribution(
    store: &dyn RaffleStore,
    entry_ids: &[String],
    target_code: &str,
) -> Result<TransferReport, ServiceError> {
    let target = store
        .find_referrer_by_code(target_code.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("referral code `{target_code}`")))?;

    let mut unique_ids = entry_ids.to_vec();
    unique_ids.sort();
    unique_ids.dedup();
    let entries = store.find_entries(unique_ids.clone()).await?;
    if entries.len() != unique_ids.len() {
        let missing: Vec<&String> = unique_ids
            .iter()
            .filter(|id| !entries.iter().any(|entry| &entry.id == *id))
            .collect();
        return Err(ServiceError::NotFound(format!("sale entries {missing:?}")));
    }

    let mut deltas = PendingDeltas::new();
    let mut rewrites: Vec<SaleEntryEntity> = Vec::new();
    let mut report = TransferReport {
        entries_moved: 0,
        tickets_moved: 0,
        amount_moved: Money::ZERO,
    };

    for mut entry in entries {
        if entry.referrer_id == Some(target.id) {
            continue;
        }
        let contribution = entry.tally();
        if let Some(previous) = entry.referrer_id {
            deltas.add(
                CounterKey::Referrer {
                    id: previous,
                    entry_type: entry.entry_type,
                },
                -contribution,
            );
        }
        deltas.add(
            CounterKey::Referrer {
                id: target.id,
                entry_type: entry.entry_type,
            },
            contribution,
        );
        entry.referrer_id = Some(target.id);
        entry.referral_code = Some(target.referral_code.clone());
        report.entries_moved += 1;
        report.tickets_moved += contribution.tickets;
        report.amount_moved += contribution.amount;
        rewrites.push(entry);
    }

    for entry in rewrites {
        if !store.replace_entry(entry.clone()).await? {
            warn!(entry_id = %entry.id, "entry vanished during transfer");
            return Err(ServiceError::Internal(format!(
                "sale entry `{}` disappeared while being transferred",
                entry.id
            )));
        }
    }
    deltas.commit(store).await?;

    info!(
        target = %target.referral_code,
        entries = report.entries_moved,
        tickets = report.tickets_moved,
        amount = %report.amount_moved,
        "attribution transfer committed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::raffle_store::memory::MemoryRaffleStore;

    #[test]
    fn derives_first_name_and_last_initial() {
        assert_eq!(derive_referral_code("Jane Doe").as_deref(), Some("JaneD"));
        assert_eq!(
            derive_referral_code("  Mary Ann  smith ").as_deref(),
            Some("MaryS")
        );
        assert_eq!(derive_referral_code("Cher").as_deref(), Some("CherX"));
        assert_eq!(derive_referral_code("   "), None);
    }

    #[test]
    fn derived_codes_keep_only_ascii_letters_and_digits() {
        for (name, expected) in [
            ("Anne-Marie Smith", "AnneMarieS"),
            ("José Díaz", "JosD"),
            ("O'Brien Ó'Neill", "OBrienN"),
        ] {
            let code = derive_referral_code(name).unwrap();
            assert_eq!(code, expected);
            assert!(validate_referral_code(&code).is_ok());
        }
        assert_eq!(derive_referral_code("李小龍"), None);

        let long = derive_referral_code(&format!("{} Doe", "a".repeat(60))).unwrap();
        assert_eq!(long.len(), MAX_REFERRAL_CODE_LEN);
        assert!(validate_referral_code(&long).is_ok());
    }

    #[tokio::test]
    async fn unusable_codes_are_rejected_at_creation() {
        let store = MemoryRaffleStore::new();
        assert!(matches!(
            create_referrer(&store, "李小龍", None).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            create_referrer(&store, "Jane Doe", Some("Jane-D")).await,
            Err(ServiceError::InvalidInput(_))
        ));
        let lee = create_referrer(&store, "李小龍", Some("BruceL"))
            .await
            .unwrap();
        assert_eq!(lee.referral_code, "BruceL");
    }

    #[tokio::test]
    async fn explicit_code_wins_and_codes_stay_unique() {
        let store = MemoryRaffleStore::new();
        let jane = create_referrer(&store, "Jane Doe", None).await.unwrap();
        assert_eq!(jane.referral_code, "JaneD");

        let custom = create_referrer(&store, "John Dunn", Some("JDUNN"))
            .await
            .unwrap();
        assert_eq!(custom.referral_code, "JDUNN");

        let clash = create_referrer(&store, "Jane Dale", None).await;
        assert!(matches!(clash, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn clicks_need_a_known_code() {
        let store = MemoryRaffleStore::new();
        create_referrer(&store, "Jane Doe", None).await.unwrap();
        record_click(&store, "JaneD").await.unwrap();
        record_click(&store, "JaneD").await.unwrap();
        let jane = store
            .find_referrer_by_code("JaneD".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(jane.click_count, 2);
        assert!(matches!(
            record_click(&store, "Nobody").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_code_resolves_to_none() {
        let store = MemoryRaffleStore::new();
        assert!(resolve(&store, Some("Ghost")).await.unwrap().is_none());
        assert!(resolve(&store, None).await.unwrap().is_none());
    }
}
