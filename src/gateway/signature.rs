//! `Payment-Signature` header: `t=<unix seconds>,v1=<hex hmac-sha256 of "t.payload">`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "payment-signature";

/// Reasons a webhook delivery fails authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Header is not `t=<unix>,v1=<hex>`.
    #[error("signature header is malformed")]
    Malformed,
    /// Timestamp is outside the tolerance window.
    #[error("signature timestamp is outside the tolerance window")]
    Expired,
    /// No signature matches the payload.
    #[error("signature does not match payload")]
    Mismatch,
    /// No secret to verify with.
    #[error("webhook secret is empty")]
    EmptySecret,
}

struct ParsedHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<ParsedHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            // Unknown schemes (e.g. `v0`) are ignored.
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }
    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(ParsedHeader {
            timestamp,
            signatures,
        }),
        _ => Err(SignatureError::Malformed),
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::EmptySecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn unix_seconds(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Check `header` against `payload` with the shared `secret`.
///
/// The comparison runs in constant time; any `v1` entry may match.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: SystemTime,
) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;
    let age = unix_seconds(now).abs_diff(parsed.timestamp);
    if age > tolerance.as_secs() {
        return Err(SignatureError::Expired);
    }
    let mac = mac_for(secret, parsed.timestamp, payload)?;
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produce a header value for `payload` signed at `at`.
pub fn sign(payload: &[u8], secret: &str, at: SystemTime) -> Result<String, SignatureError> {
    let timestamp = unix_seconds(at);
    let mac = mac_for(secret, timestamp, payload)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const TOLERANCE: Duration = Duration::from_secs(300);

    #[test]
    fn signed_payload_verifies() {
        let now = SystemTime::now();
        let header = sign(b"{\"id\":\"evt_1\"}", SECRET, now).unwrap();
        assert_eq!(
            verify(b"{\"id\":\"evt_1\"}", &header, SECRET, TOLERANCE, now),
            Ok(())
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let now = SystemTime::now();
        let header = sign(b"{\"amount\":100}", SECRET, now).unwrap();
        assert_eq!(
            verify(b"{\"amount\":999}", &header, SECRET, TOLERANCE, now),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify(b"{\"amount\":100}", &header, "whsec_other", TOLERANCE, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let signed_at = SystemTime::now() - Duration::from_secs(301);
        let header = sign(b"{}", SECRET, signed_at).unwrap();
        assert_eq!(
            verify(b"{}", &header, SECRET, TOLERANCE, SystemTime::now()),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let now = SystemTime::now();
        for header in ["", "t=abc,v1=00", "v1=deadbeef", "t=1700000000", "t=1,v1=zz"] {
            assert_eq!(
                verify(b"{}", header, SECRET, TOLERANCE, now),
                Err(SignatureError::Malformed),
                "header `{header}`"
            );
        }
    }

    #[test]
    fn extra_schemes_are_ignored() {
        let now = SystemTime::now();
        let header = sign(b"{}", SECRET, now).unwrap();
        let with_v0 = format!("{header},v0=abcdef");
        assert_eq!(verify(b"{}", &with_v0, SECRET, TOLERANCE, now), Ok(()));
    }
}
