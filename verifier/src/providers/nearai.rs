//! NearAI report fetcher.
//!
//! NearAI returns a multi-component report (gateway + models). The quote
//! surfaced in the envelope is the first model attestation's; the full
//! document rides along in `raw` for the composite verifier.

use serde_json::Value;
use std::time::Duration;

use crate::error::Error;
use crate::providers::generate_nonce;
use crate::types::{parse_if_string, AttestationReport, Provider};

pub const NEARAI_API: &str = "https://cloud-api.near.ai/v1";

#[derive(Debug, Clone)]
pub struct NearaiProvider {
    api_base: String,
    http: reqwest::Client,
}

impl Default for NearaiProvider {
    fn default() -> Self {
        Self::new(NEARAI_API)
    }
}

impl NearaiProvider {
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
            "Fetching NearAI report for {} with nonce {}...",
            model_id,
            &nonce[..8]
        );

        let data: Value = self
            .http
            .get(&url)
            .query(&[
                ("model", model_id),
                ("signing_algo", "ecdsa"),
                ("nonce", nonce.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let first = data
            .get("model_attestations")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .ok_or_else(|| {
                Error::Provider("NearAI report missing model_attestations".to_string())
            })?;

        let intel_quote = first
            .get("intel_quote")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::Provider("NearAI attestation missing intel_quote".to_string()))?;

        let nvidia_payload = first
            .get("nvidia_payload")
            .filter(|v| !v.is_null())
            .map(parse_if_string);

        Ok(AttestationReport {
            provider: Provider::Nearai,
            model_id: Some(model_id.to_string()),
            intel_quote,
            request_nonce: Some(nonce),
            nvidia_payload,
            raw: Some(data),
        })
    }

    pub async fn list_models(&self) -> Result<Vec<String>, Error> {
        let url = format!("{}/model/list", self.api_base);
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
                .get("models")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        };
        Ok(models
            .iter()
            .filter_map(|m| match m {
                Value::String(s) => Some(s.clone()),
                other => other
                    .get("modelId")
                    .and_then(Value::as_str)
                    .map(String::from),
            })
            .collect())
    }
}
