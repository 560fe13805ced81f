//! Minimal JWT payload decoding for attestation tokens.
//!
//! NRAS device tokens and Intel Trust Authority appraisal tokens are
//! decoded without signature verification: transport security plus the
//! respective API key is what is trusted today.
//! TODO: fetch the NVIDIA / Intel JWKS and verify token signatures.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

/// Decode the claims segment of a JWT. Returns `None` for anything that is
/// not a three-part token with a base64url JSON payload.
pub fn decode_payload(token: &str) -> Option<Map<String, Value>> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    match serde_json::from_slice::<Value>(&decoded).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
