//! Raffle Back binary entrypoint wiring the REST API, the payment gateway and the raffle store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raffle_back::{
    config::AppConfig,
    dao::{
        raffle_store::{RaffleStore, memory::MemoryRaffleStore},
        storage::StorageError,
    },
    gateway::{PaymentGateway, fake::FakeGateway, stripe::StripeGateway},
    routes,
    services::{storage_supervisor, sweeper},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let gateway = build_gateway(&config)?;
    let app_state = AppState::new(config, gateway);

    spawn_storage_supervisor(app_state.clone())?;
    tokio::spawn(sweeper::run(app_state.clone()));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Stripe-compatible client when a secret key is configured, the in-process gateway otherwise.
fn build_gateway(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match config.payment_secret_key.as_deref() {
        Some(secret_key) => {
            let gateway = StripeGateway::new(&config.gateway_base_url, secret_key)
                .context("building payment gateway client")?;
            Ok(Arc::new(gateway))
        }
        None => {
            warn!("PAYMENT_SECRET_KEY is not set; payments go to the in-process fake gateway");
            Ok(Arc::new(FakeGateway::new()))
        }
    }
}

/// Start the supervisor for the backend named by `STORAGE_BACKEND` (default `mongo`).
fn spawn_storage_supervisor(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "mongo".into());
    info!(backend = %backend, "selecting raffle store");

    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use raffle_back::dao::raffle_store::mongodb::{MongoConfig, MongoRaffleStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoRaffleStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RaffleStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use raffle_back::dao::raffle_store::couchdb::{CouchConfig, CouchRaffleStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchRaffleStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RaffleStore>)
            }));
        }
        "memory" => {
            warn!("using the in-memory raffle store; data is lost on restart");
            let store = MemoryRaffleStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RaffleStore>) }
            }));
        }
        other => anyhow::bail!("unsupported STORAGE_BACKEND `{other}`"),
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
