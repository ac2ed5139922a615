//! Stripe webhook signature verification.
//!
//! Header format: `t=<unix timestamp>,v1=<hex hmac>[,v1=...]`. The signed
//! payload is `"{t}.{body}"` under HMAC-SHA256 with the endpoint secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("No signature found")]
    Missing,
    #[error("Malformed signature header")]
    Malformed,
    #[error("Timestamp outside the tolerance window")]
    Expired,
    #[error("No signatures found matching the expected signature for payload")]
    Mismatch,
}

fn sign(payload: &[u8], timestamp: &str, secret: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies `header` against `payload`, accepting timestamps within `tolerance_secs` of `now`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    if header.trim().is_empty() {
        return Err(SignatureError::Missing);
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    let issued: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if now.abs_diff(issued) > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    let expected = sign(payload, timestamp, secret)?;
    let matched = signatures
        .iter()
        .any(|sig| bool::from(expected.as_bytes().ct_eq(sig.as_bytes())));
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Builds a valid header for `payload`; used by tests and local tooling.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let ts = timestamp.to_string();
    match sign(payload, &ts, secret) {
        Ok(sig) => format!("t={},v1={}", ts, sig),
        Err(_) => format!("t={}", ts),
    }
}
