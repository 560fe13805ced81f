//! Tinfoil report fetcher.
//!
//! Tinfoil enclaves publish their attestation at a well-known HTTPS path.
//! The body is a base64 gzip of the raw TDX quote bytes; the model's
//! enclave hostname and Sigstore repo come from the YAML model map.

use flate2::read::GzDecoder;
use serde_json::Value;
use std::io::Read;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::ModelConfig;
use crate::error::Error;
use crate::types::{AttestationReport, Provider};

const EXPECTED_FORMAT_PREFIX: &str = "https://tinfoil.sh/predicate/tdx-guest/";

#[derive(Debug, Clone)]
pub struct TinfoilProvider {
    config: ModelConfig,
    http: reqwest::Client,
}

impl TinfoilProvider {
    pub fn new(config: ModelConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { config, http }
    }

    pub fn list_models(&self) -> Vec<String> {
        self.config.model_names()
    }

    pub async fn fetch_report(&self, model_id: &str) -> Result<AttestationReport, Error> {
        let host = self.resolve_host(model_id)?;
        let url = format!("https://{}/.well-known/tinfoil-attestation", host);
        tracing::info!("Fetching Tinfoil attestation from {}", url);

        let mut data: Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let format = data
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if !format.starts_with(EXPECTED_FORMAT_PREFIX) {
            return Err(Error::Provider(format!(
                "Unsupported Tinfoil attestation format: {}",
                if format.is_empty() { "missing" } else { &format }
            )));
        }

        let body = data
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Provider("Tinfoil response missing body".to_string()))?;
        let quote_hex = decompress_quote(body)?;

        // Enrich the passthrough so the verifier bundle picks up the repo.
        if let Some(obj) = data.as_object_mut() {
            if let Some(repo) = self.config.repo(model_id) {
                obj.insert("repo".into(), repo.into());
            }
            obj.insert("model_id".into(), model_id.into());
        }

        Ok(AttestationReport {
            provider: Provider::Tinfoil,
            model_id: Some(model_id.to_string()),
            intel_quote: quote_hex,
            request_nonce: None,
            nvidia_payload: None,
            raw: Some(data),
        })
    }

    /// Model names resolve through the config map; anything with a dot is
    /// taken as a literal enclave host.
    fn resolve_host(&self, model_id: &str) -> Result<String, Error> {
        if let Some(host) = self.config.enclave_host(model_id) {
            return Ok(host.to_string());
        }
        if model_id.contains('.') {
            return Ok(model_id.to_string());
        }
        Err(Error::LookupMiss(format!(
            "Unknown Tinfoil model: {}",
            model_id
        )))
    }
}

/// base64(gzip(quote bytes)) → lowercase hex.
fn decompress_quote(body_b64: &str) -> Result<String, Error> {
    let compressed = STANDARD
        .decode(body_b64)
        .map_err(|e| Error::Provider(format!("invalid attestation body base64: {}", e)))?;
    let mut quote_bytes = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut quote_bytes)
        .map_err(|e| Error::Provider(format!("invalid attestation body gzip: {}", e)))?;
    Ok(hex::encode(quote_bytes))
}
