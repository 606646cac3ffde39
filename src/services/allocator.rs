//! Claims unique ticket numbers from the bounded keyspace `1..=N`.

use std::time::SystemTime;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{InsertOutcome, TicketEntity},
        raffle_store::RaffleStore,
    },
    error::ServiceError,
    state::sale::PurchaserInfo,
};

/// Candidate order for one reservation attempt budget of `2N`.
///
/// Each pass over the keyspace is an independent uniform shuffle, so concurrent callers spread
/// out and a single call never tries the same number twice within a pass.
fn candidate_order(keyspace: u32) -> Vec<u32> {
    let mut rng = rand::rng();
    let mut order = Vec::with_capacity(keyspace as usize * 2);
    for _ in 0..2 {
        let mut pass: Vec<u32> = (1..=keyspace).collect();
        pass.shuffle(&mut rng);
        order.extend(pass);
    }
    order
}

/// Reserve a free ticket number for `purchaser`.
///
/// Collisions with concurrent callers are expected and retried with the next candidate; other
/// storage failures are logged and retried within the same budget. Running out of attempts is
/// reported as [`ServiceError::SoldOut`].
pub async fn reserve(
    store: &dyn RaffleStore,
    keyspace: u32,
    purchaser: &PurchaserInfo,
) -> Result<u32, ServiceError> {
    let candidates = candidate_order(keyspace);
    for (attempt, number) in candidates.iter().copied().enumerate() {
        let reservation = TicketEntity::reserved(number, purchaser, SystemTime::now());
        match store.insert_ticket(reservation).await {
            Ok(InsertOutcome::Inserted) => {
                info!(ticket = number, attempts = attempt + 1, "ticket reserved");
                return Ok(number);
            }
            Ok(InsertOutcome::Occupied) => {
                debug!(ticket = number, "ticket number taken; trying another");
            }
            Err(err) => {
                warn!(ticket = number, error = %err, "reservation write failed; trying another");
            }
        }
    }
    info!(keyspace, attempts = candidates.len(), "no free ticket number");
    Err(ServiceError::SoldOut)
}

/// Compensating delete of a reservation whose payment could not be set up.
pub async fn release(store: &dyn RaffleStore, number: u32) {
    match store.delete_reservation(number).await {
        Ok(true) => info!(ticket = number, "reservation rolled back"),
        Ok(false) => warn!(ticket = number, "reservation already gone during rollback"),
        Err(err) => warn!(
            ticket = number,
            error = %err,
            "failed to roll back reservation; the sweeper will reclaim it"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;
    use crate::dao::raffle_store::memory::MemoryRaffleStore;

    fn purchaser(name: &str) -> PurchaserInfo {
        PurchaserInfo {
            name: name.into(),
            email: format!("{}@example.org", name.to_lowercase()),
            phone: None,
        }
    }

    #[test]
    fn candidate_order_covers_keyspace_twice() {
        let order = candidate_order(5);
        assert_eq!(order.len(), 10);
        let first: HashSet<u32> = order[..5].iter().copied().collect();
        let second: HashSet<u32> = order[5..].iter().copied().collect();
        assert_eq!(first, (1..=5).collect());
        assert_eq!(second, (1..=5).collect());
    }

    #[tokio::test]
    async fn parallel_reservations_never_share_a_number() {
        let store = Arc::new(MemoryRaffleStore::new());
        let mut handles = Vec::new();
        for index in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                reserve(store.as_ref(), 25, &purchaser(&format!("Buyer{index}"))).await
            }));
        }

        let mut won = Vec::new();
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(number) => won.push(number),
                Err(ServiceError::SoldOut) => sold_out += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let unique: HashSet<u32> = won.iter().copied().collect();
        assert_eq!(unique.len(), won.len());
        assert_eq!(won.len(), 25);
        assert_eq!(sold_out, 15);
        assert!(won.iter().all(|number| (1..=25).contains(number)));
    }

    #[tokio::test]
    async fn empty_keyspace_is_sold_out() {
        let store = MemoryRaffleStore::new();
        assert!(matches!(
            reserve(&store, 0, &purchaser("Jane")).await,
            Err(ServiceError::SoldOut)
        ));
    }

    #[tokio::test]
    async fn release_frees_the_number() {
        let store = MemoryRaffleStore::new();
        let number = reserve(&store, 1, &purchaser("Jane")).await.unwrap();
        release(&store, number).await;
        assert_eq!(reserve(&store, 1, &purchaser("John")).await.unwrap(), number);
    }
}
