//! Redpill report fetcher.
//!
//! Redpill models are Phala Cloud apps; a fresh nonce is embedded into the
//! attestation request so the returned quote's report_data can be bound to
//! this caller.

use serde_json::Value;
use std::time::Duration;

use crate::error::Error;
use crate::providers::generate_nonce;
use crate::types::{parse_if_string, AttestationReport, Provider};

pub const REDPILL_API: &str = "https://api.redpill.ai/v1";

#[derive(Debug, Clone)]
pub struct RedpillProvider {
    api_base: String,
    http: reqwest::Client,
}

impl Default for RedpillProvider {
    fn default() -> Self {
        Self::new(REDPILL_API)
    }
}

impl RedpillProvider {
    pub fn new(api_base: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub async fn fetch_report(&self, model_id: &str) -> Result<AttestationReport, Error> {
        let nonce = generate_nonce();
        let url = format!("{}/attestation/report", self.api_base);
        tracing::info!(
            "Fetching Redpill report for {} with nonce {}...",
            model_id,
            &nonce[..8]
        );

        let mut data: Value = self
            .http
            .get(&url)
            .query(&[("model", model_id), ("nonce", nonce.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let intel_quote = data
            .get("intel_quote")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::Provider("Redpill report missing intel_quote".to_string()))?;

        let nvidia_payload = data
            .get("nvidia_payload")
            .filter(|v| !v.is_null())
            .map(parse_if_string);

        // The verifier looks up the Phala app through the model ID.
        data["model_id"] = model_id.into();

        Ok(AttestationReport {
            provider: Provider::Redpill,
            model_id: Some(model_id.to_string()),
            intel_quote,
            request_nonce: Some(nonce),
            nvidia_payload,
            raw: Some(data),
        })
    }

    pub async fn list_models(&self) -> Result<Vec<String>, Error> {
        let url = format!("{}/models", self.api_base);
        let data: Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let models = match &data {
            Value::Array(list) => list.clone(),
            other => other
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        };
        Ok(models
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str).map(String::from))
            .collect())
    }
}
