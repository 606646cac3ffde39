/// Payment-intent lifecycle.
pub mod intent;
/// Money, categories and sale terms.
pub mod sale;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig, dao::raffle_store::RaffleStore, error::ServiceError,
    gateway::PaymentGateway,
};

/// Shared handle on [`AppState`].
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, payment gateway and configuration.
pub struct AppState {
    store: RwLock<Option<Arc<dyn RaffleStore>>>,
    degraded: watch::Sender<bool>,
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, gateway: Arc<dyn PaymentGateway>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            gateway,
            config: Arc::new(config),
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn RaffleStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while running without one.
    pub async fn require_store(&self) -> Result<Arc<dyn RaffleStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn RaffleStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Payment gateway handle.
    pub fn gateway(&self) -> Arc<dyn PaymentGateway> {
        self.gateway.clone()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
