//! NVIDIA Remote Attestation Service (NRAS) client.
//!
//! GPU evidence is posted as-is; NRAS answers with
//! `[["JWT", platform_jwt], {device_id: device_jwt, ...}]`. The platform
//! token's `x-nvidia-overall-att-result` claim is the verdict. Device and
//! platform claims are merged into the result for consumers.

use serde_json::{Map, Value};
use std::time::Duration;

use crate::jwt;
use crate::types::{HardwareType, VerificationResult};

pub const NRAS_GPU_URL: &str = "https://nras.attestation.nvidia.com/v3/attest/gpu";

#[derive(Debug, Clone)]
pub struct NvidiaClient {
    url: String,
    http: reqwest::Client,
}

impl Default for NvidiaClient {
    fn default() -> Self {
        Self::new(NRAS_GPU_URL)
    }
}

impl NvidiaClient {
    pub fn new(url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            url: url.into(),
            http,
        }
    }

    /// Attest GPU evidence against NRAS.
    ///
    /// Always returns a result; transport failures and malformed responses
    /// come back as `model_verified = false` with the failure in `error`.
    pub async fn verify(&self, payload: &Value) -> VerificationResult {
        let mut result = VerificationResult::new("nvidia");
        result.hardware_type = vec![HardwareType::NvidiaCc];

        let tokens = match self.attest(payload).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!("NRAS attestation failed: {}", e);
                result.error = Some(e);
                return result;
            }
        };

        let (platform_claims, device_claims) = match split_tokens(&tokens) {
            Ok(claims) => claims,
            Err(e) => {
                result.error = Some(e);
                return result;
            }
        };

        let overall = platform_claims
            .get("x-nvidia-overall-att-result")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // Shallow merge: platform claims first, first device's claims on top.
        let mut claims = platform_claims;
        claims.extend(device_claims);

        result.model_verified = overall;
        result.claims = claims;
        result.raw = Some(tokens);
        if !overall {
            result.error = Some("Nvidia attestation result is false".to_string());
        }
        result
    }

    async fn attest(&self, payload: &Value) -> Result<Value, String> {
        let response = self
            .http
            .post(&self.url)
            .header("accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("NRAS responded with status {}", status.as_u16()));
        }

        response.json::<Value>().await.map_err(|e| e.to_string())
    }
}

/// Pull the platform claims and the first device's claims out of the NRAS
/// token array.
fn split_tokens(tokens: &Value) -> Result<(Map<String, Value>, Map<String, Value>), String> {
    let entries = tokens
        .as_array()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| "Invalid response format: expected array".to_string())?;

    // Platform token at index 0, shaped ["JWT", <jwt>].
    let platform_entry = entries[0]
        .as_array()
        .filter(|e| e.first().and_then(Value::as_str) == Some("JWT"))
        .ok_or_else(|| "Invalid platform token format".to_string())?;
    let platform_jwt = platform_entry
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| "Invalid platform token format".to_string())?;
    let platform_claims = jwt::decode_payload(platform_jwt).unwrap_or_default();

    // Device tokens at index 1: {device_id: <jwt>, ...}; bare JWT strings.
    let mut device_claims = Map::new();
    if let Some(devices) = entries.get(1).and_then(Value::as_object) {
        if let Some(device_jwt) = devices.values().next().and_then(Value::as_str) {
            device_claims = jwt::decode_payload(device_jwt).unwrap_or_default();
        }
    }

    Ok((platform_claims, device_claims))
}
