use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Admin payloads: referrers, entries, totals.
pub mod admin;
/// Healthcheck payload.
pub mod health;
/// Purchase request and receipt.
pub mod purchase;
/// Referral click payloads.
pub mod referral;
/// Shared field validators.
pub mod validation;
/// Webhook acknowledgement.
pub mod webhook;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
