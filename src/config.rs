//! Application-level configuration: pricing, keyspace, timers and secrets.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::sale::Money;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RAFFLE_BACK_CONFIG_PATH";

const PAYMENT_SECRET_KEY_ENV: &str = "PAYMENT_SECRET_KEY";
const PAYMENT_WEBHOOK_SECRET_ENV: &str = "PAYMENT_WEBHOOK_SECRET";
const ADMIN_TOKEN_ENV: &str = "ADMIN_TOKEN";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// ISO currency code sent to the gateway.
    pub currency: String,
    /// Unit price of a Split The Pot ticket.
    pub raffle_ticket_price: Money,
    /// Unit price of a Rolex raffle ticket.
    pub rolex_ticket_price: Money,
    /// Size `N` of the Rolex ticket-number keyspace `1..=N`.
    pub rolex_keyspace_size: u32,
    /// Processing fee added on top of the base amount, in percent.
    pub fee_percent: Decimal,
    /// Flat processing fee added on top of the base amount.
    pub fixed_fee: Money,
    /// Upper bound on the quantity of one purchase.
    pub max_quantity_per_purchase: u32,
    /// Age after which an unpaid reservation is reclaimed.
    pub reservation_timeout: Duration,
    /// Period of the reservation sweeper.
    pub sweep_interval: Duration,
    /// Accepted clock skew between a webhook signature and now.
    pub signature_tolerance: Duration,
    /// Base URL of the payment gateway API.
    pub gateway_base_url: String,
    /// Provenance tag written on every sale entry.
    pub source_app: String,
    /// Gateway API secret, from `PAYMENT_SECRET_KEY`.
    pub payment_secret_key: Option<String>,
    /// Webhook signing secret, from `PAYMENT_WEBHOOK_SECRET`.
    pub webhook_secret: Option<String>,
    /// Token expected in `X-Admin-Token`, from `ADMIN_TOKEN`.
    pub admin_token: Option<String>,
}

impl AppConfig {
    /// Load the configuration file (or defaults) and overlay secrets from the environment.
    pub fn load() -> Self {
        Self::load_file().with_env_secrets()
    }

    fn load_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        keyspace = app_config.rolex_keyspace_size,
                        fee_percent = %app_config.fee_percent,
                        "loaded raffle configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    fn with_env_secrets(mut self) -> Self {
        self.payment_secret_key = non_empty_env(PAYMENT_SECRET_KEY_ENV);
        self.webhook_secret = non_empty_env(PAYMENT_WEBHOOK_SECRET_ENV);
        self.admin_token = non_empty_env(ADMIN_TOKEN_ENV);
        if self.webhook_secret.is_none() {
            warn!("{PAYMENT_WEBHOOK_SECRET_ENV} is not set; webhook deliveries will be refused");
        }
        if self.admin_token.is_none() {
            warn!("{ADMIN_TOKEN_ENV} is not set; admin routes are disabled");
        }
        self
    }

    /// Fee-inclusive amount charged for a fee-excluded `base`.
    pub fn charged_amount(&self, base: Money) -> Option<Money> {
        let fee = base.percentage(self.fee_percent).ok()?;
        base.checked_add(fee)?.checked_add(self.fixed_fee)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            currency: "usd".into(),
            raffle_ticket_price: Money::from_cents(10_00),
            rolex_ticket_price: Money::from_cents(100_00),
            rolex_keyspace_size: 500,
            fee_percent: Decimal::new(4, 0),
            fixed_fee: Money::ZERO,
            max_quantity_per_purchase: 100,
            reservation_timeout: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            signature_tolerance: Duration::from_secs(300),
            gateway_base_url: "https://api.stripe.com".into(),
            source_app: "raffle-back".into(),
            payment_secret_key: None,
            webhook_secret: None,
            admin_token: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// Every field is optional; missing ones keep their default.
struct RawConfig {
    currency: Option<String>,
    raffle_ticket_price: Option<Decimal>,
    rolex_ticket_price: Option<Decimal>,
    rolex_keyspace_size: Option<u32>,
    fee_percent: Option<Decimal>,
    fixed_fee: Option<Decimal>,
    max_quantity_per_purchase: Option<u32>,
    reservation_timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    signature_tolerance_secs: Option<u64>,
    gateway_base_url: Option<String>,
    source_app: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let money = |raw: Option<Decimal>, fallback: Money, field: &str| match raw {
            Some(amount) => Money::from_decimal(amount).unwrap_or_else(|err| {
                warn!(field, error = %err, "ignoring out-of-range amount");
                fallback
            }),
            None => fallback,
        };
        Self {
            currency: value.currency.unwrap_or(defaults.currency),
            raffle_ticket_price: money(
                value.raffle_ticket_price,
                defaults.raffle_ticket_price,
                "raffle_ticket_price",
            ),
            rolex_ticket_price: money(
                value.rolex_ticket_price,
                defaults.rolex_ticket_price,
                "rolex_ticket_price",
            ),
            rolex_keyspace_size: value
                .rolex_keyspace_size
                .unwrap_or(defaults.rolex_keyspace_size),
            fee_percent: value.fee_percent.unwrap_or(defaults.fee_percent),
            fixed_fee: money(value.fixed_fee, defaults.fixed_fee, "fixed_fee"),
            max_quantity_per_purchase: value
                .max_quantity_per_purchase
                .unwrap_or(defaults.max_quantity_per_purchase),
            reservation_timeout: value
                .reservation_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reservation_timeout),
            sweep_interval: value
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            signature_tolerance: value
                .signature_tolerance_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.signature_tolerance),
            gateway_base_url: value.gateway_base_url.unwrap_or(defaults.gateway_base_url),
            source_app: value.source_app.unwrap_or(defaults.source_app),
            payment_secret_key: None,
            webhook_secret: None,
            admin_token: None,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}
