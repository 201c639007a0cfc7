//! Signature algorithm for outbound webhooks.
//!
//! Every webhook body is signed with the store's webhook secret and the
//! result is sent in the `X-Sign` header:
//!
//! ```text
//! X-Sign: hex(HMAC-SHA256(raw_json_body, store_secret))
//! ```
//!
//! The signature covers the exact bytes on the wire, so receivers must verify
//! against the raw body before parsing it.

use bytes::Bytes;

use crate::objects::webhook::{WebhookEventName, WebhookPayload};

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Sign";

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid signature")]
    SignatureMismatch,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// Compute the hex encoded `HMAC-SHA256(payload, key)`.
pub fn sign_payload(payload: &[u8], key: &[u8]) -> String {
    let signature = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        payload,
    );
    hex::encode(signature.as_ref())
}

/// Verify an `X-Sign` header value against the raw payload bytes.
pub fn verify_payload(payload: &[u8], header_value: &str, key: &[u8]) -> Result<(), SignatureError> {
    let signature = hex::decode(header_value.trim()).map_err(|_| SignatureError::InvalidHex)?;
    ring::hmac::verify(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        payload,
        &signature,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SignedPayload
// ---------------------------------------------------------------------------

/// A serialized webhook body together with its event name and `X-Sign` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub event: WebhookEventName,
    pub json: Bytes,
    pub signature: String,
}

impl SignedPayload {
    /// Serialize `body` to JSON and sign the resulting bytes with `key`.
    pub fn new<T: WebhookPayload>(body: &T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let json = Bytes::from(serde_json::to_vec(body)?);
        let signature = sign_payload(&json, key);
        Ok(Self {
            event: body.event(),
            json,
            signature,
        })
    }
}
