//! Reclaims reservations that were never paid.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{dao::raffle_store::RaffleStore, error::ServiceError, state::SharedState};

/// Delete every reservation created more than `timeout` before `now`.
///
/// Terminal tickets are never touched, so sweeping is idempotent and safe to run concurrently.
pub async fn sweep_expired(
    store: &dyn RaffleStore,
    timeout: Duration,
    now: SystemTime,
) -> Result<u64, ServiceError> {
    let cutoff = now.checked_sub(timeout).unwrap_or(UNIX_EPOCH);
    let removed = store.delete_expired_reservations(cutoff).await?;
    if removed > 0 {
        info!(removed, "expired reservations swept");
    } else {
        debug!("no expired reservations");
    }
    Ok(removed)
}

/// Run [`sweep_expired`] on the configured interval for the lifetime of the process.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let store = match state.require_store().await {
            Ok(store) => store,
            Err(_) => {
                debug!("storage unavailable; skipping sweep");
                continue;
            }
        };
        let timeout = state.config().reservation_timeout;
        if let Err(err) = sweep_expired(store.as_ref(), timeout, SystemTime::now()).await {
            warn!(error = %err, "reservation sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            models::{TicketEntity, TicketStatus},
            raffle_store::memory::MemoryRaffleStore,
        },
        state::sale::PurchaserInfo,
    };

    const TIMEOUT: Duration = Duration::from_secs(600);

    fn purchaser() -> PurchaserInfo {
        PurchaserInfo {
            name: "Jane Doe".into(),
            email: "jane@example.org".into(),
            phone: None,
        }
    }

    #[tokio::test]
    async fn expired_reservation_is_deleted_exactly_once() {
        let store = MemoryRaffleStore::new();
        let created = SystemTime::now();
        store
            .insert_ticket(TicketEntity::reserved(7, &purchaser(), created))
            .await
            .unwrap();

        let later = created + TIMEOUT + Duration::from_secs(1);
        assert_eq!(sweep_expired(&store, TIMEOUT, later).await.unwrap(), 1);
        assert_eq!(sweep_expired(&store, TIMEOUT, later).await.unwrap(), 0);
        assert_eq!(sweep_expired(&store, TIMEOUT, later).await.unwrap(), 0);
        assert_eq!(store.ticket_count(), 0);
    }

    #[tokio::test]
    async fn fresh_and_paid_tickets_survive() {
        let store = MemoryRaffleStore::new();
        let created = SystemTime::now();
        store
            .insert_ticket(TicketEntity::reserved(1, &purchaser(), created))
            .await
            .unwrap();
        let mut paid = TicketEntity::reserved(2, &purchaser(), created);
        paid.status = TicketStatus::Paid;
        store.insert_ticket(paid).await.unwrap();

        // Young reservation: nothing to do.
        assert_eq!(sweep_expired(&store, TIMEOUT, created).await.unwrap(), 0);

        let later = created + TIMEOUT + Duration::from_secs(1);
        assert_eq!(sweep_expired(&store, TIMEOUT, later).await.unwrap(), 1);
        let survivor = store.find_ticket(2).await.unwrap().unwrap();
        assert_eq!(survivor.status, TicketStatus::Paid);
    }
}
