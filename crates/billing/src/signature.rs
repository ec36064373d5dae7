//! Webhook signature verification
//!
//! Verification is a hard gate: nothing downstream of this module runs for
//! a payload that fails here.
//!
//! Lemon Squeezy signs the exact raw request body with HMAC-SHA256 and
//! sends the hex digest in `X-Signature`. Stripe signs
//! `"{timestamp}.{body}"` and sends `t=...,v1=...` in `stripe-signature`;
//! we delegate to the SDK's verifier first and fall back to checking the
//! scheme by hand when the SDK rejects a payload from a newer API version
//! it cannot parse.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use stripe::{Event, Webhook};
use subtle::ConstantTimeEq;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Seconds of clock skew tolerated on Stripe's signed timestamp.
const STRIPE_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Verify a Lemon Squeezy webhook body against its `X-Signature` header.
pub fn verify_lemon_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    if signature_header.is_empty() || secret.is_empty() {
        return Err(SignatureError::Missing);
    }

    let expected = hex::decode(signature_header.trim()).map_err(|_| SignatureError::Mismatch)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Missing)?;
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    if bool::from(computed.as_slice().ct_eq(expected.as_slice())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verify and parse a Stripe webhook event.
///
/// Tries the SDK verifier first, then falls back to manual verification of
/// the same scheme so that events from API versions newer than the SDK
/// still pass the signature gate and parse leniently.
pub fn verify_stripe_event(
    payload: &str,
    signature_header: &str,
    secret: &str,
) -> Result<Event, SignatureError> {
    if signature_header.is_empty() || secret.is_empty() {
        return Err(SignatureError::Missing);
    }

    match Webhook::construct_event(payload, signature_header, secret) {
        Ok(event) => return Ok(event),
        Err(e) => {
            tracing::debug!(
                stripe_error = %e,
                "SDK webhook parsing failed, trying manual verification"
            );
        }
    }

    verify_stripe_signature(payload, signature_header, secret)?;

    serde_json::from_str(payload).map_err(|e| SignatureError::Malformed(e.to_string()))
}

/// Manual verification of Stripe's `t=timestamp,v1=signature` scheme.
pub(crate) fn verify_stripe_signature(
    payload: &str,
    signature_header: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<&str> = None;

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => v1_signature = Some(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Missing)?;
    let v1_signature = v1_signature.ok_or(SignatureError::Missing)?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| SignatureError::Mismatch)?
        .as_secs() as i64;

    if (now - timestamp).abs() > STRIPE_TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            skew_secs = (now - timestamp).abs(),
            "Stripe webhook timestamp outside tolerance window"
        );
        return Err(SignatureError::Mismatch);
    }

    let signed_payload = format!("{timestamp}.{payload}");

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Missing)?;
    mac.update(signed_payload.as_bytes());
    let computed = mac.finalize().into_bytes();

    let expected = hex::decode(v1_signature).map_err(|_| SignatureError::Mismatch)?;

    if bool::from(computed.as_slice().ct_eq(expected.as_slice())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
