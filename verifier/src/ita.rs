//! Intel Trust Authority appraisal (optional side-check).
//!
//! When an API key is configured, quotes are additionally appraised by
//! ITA and the decoded token claims are attached under
//! `claims.intel_trust_authority`. This check only ever adds claims, so
//! every failure is swallowed silently.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::jwt;

pub const ITA_ATTEST_URL: &str = "https://api.trustauthority.intel.com/appraisal/v2/attest";

#[derive(Debug, Clone)]
pub struct ItaClient {
    url: String,
    api_key: String,
    http: reqwest::Client,
}

impl ItaClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_url(ITA_ATTEST_URL, api_key)
    }

    pub fn with_url(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            url: url.into(),
            api_key: api_key.into(),
            http,
        }
    }

    /// Appraise a quote and return the decoded token claims, or `None` on
    /// any failure.
    pub async fn appraise(&self, quote_bytes: &[u8]) -> Option<Map<String, Value>> {
        let body = serde_json::json!({
            "tdx": {"quote": STANDARD.encode(quote_bytes)},
        });

        let response = self
            .http
            .post(&self.url)
            .header("Accept", "application/json")
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .ok()?;

        if response.status() != reqwest::StatusCode::OK {
            tracing::debug!("ITA appraisal returned {}", response.status());
            return None;
        }

        let data = response.json::<Value>().await.ok()?;
        let token = data.get("token")?.as_str()?;
        jwt::decode_payload(token)
    }
}
