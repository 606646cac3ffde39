use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{raffle_store::RaffleStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Connect to the raffle store and keep the shared state in degraded mode while it is unreachable.
///
/// Runs forever: after a lost connection that cannot be recovered in place, `connect` is called
/// again with exponential backoff.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RaffleStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_store(store.clone()).await;
                info!("raffle store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch(&state, store.as_ref()).await;

                warn!("raffle store lost; reconnecting from scratch");
                sleep(delay).await;
                delay = backoff(delay);
            }
            Err(err) => {
                warn!(error = %err, "raffle store connection attempt failed");
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
}

/// Poll `store` until it fails and cannot be revived in place.
async fn watch(state: &SharedState, store: &dyn RaffleStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("raffle store healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                warn!(error = %err, "raffle store health check failed");
                if !reconnect(state, store).await {
                    warn!("exhausted raffle store reconnect attempts; staying degraded");
                    return;
                }
                state.update_degraded(false);
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Try `try_reconnect` a few times, entering degraded mode after the first failure.
async fn reconnect(state: &SharedState, store: &dyn RaffleStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "raffle store reconnected");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    state.update_degraded(true);
                }
                warn!(attempt, error = %err, "raffle store reconnect attempt failed");
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
    false
}
