//! Client for the external dstack-verifier service.
//!
//! The service validates a dstack TEE environment (quote signature, OS
//! image hash, event log replay) and reports the app's compose hash back
//! in its details. It is treated as a black-box oracle: we only speak its
//! wire format. Unreachable service = invalid component (fail-closed).

use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Verdict returned by the dstack-verifier `/verify` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DstackVerdict {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// Hex report_data of the verified quote, when the service surfaces it.
    #[serde(default)]
    pub report_data: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl DstackVerdict {
    fn failed(reason: String) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason),
            ..Default::default()
        }
    }

    /// The attested docker-compose hash from `details.app_info.compose_hash`.
    pub fn compose_hash(&self) -> Option<&str> {
        self.details
            .get("app_info")?
            .get("compose_hash")?
            .as_str()
    }
}

/// HTTP client for one dstack-verifier deployment.
#[derive(Debug, Clone)]
pub struct DstackClient {
    base_url: String,
    http: reqwest::Client,
}

impl DstackClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Verify one dstack environment.
    ///
    /// `event_log` and `vm_config` must already be JSON strings (the
    /// service re-parses them itself). Any transport or decode failure is
    /// returned as an invalid verdict carrying the error as `reason`.
    pub async fn verify(&self, quote: &str, event_log: &str, vm_config: &str) -> DstackVerdict {
        let url = format!("{}/verify", self.base_url);
        tracing::info!("Verifying with dstack-verifier service at {}", url);

        let payload = serde_json::json!({
            "quote": quote,
            "event_log": event_log,
            "vm_config": vm_config,
        });

        let response = match self.http.post(&url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("dstack-verifier unreachable: {}", e);
                return DstackVerdict::failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("dstack-verifier returned {}: {}", status, body);
            return DstackVerdict::failed(format!("dstack-verifier returned {}", status));
        }

        match response.json::<DstackVerdict>().await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!("dstack-verifier response decode failed: {}", e);
                DstackVerdict::failed(e.to_string())
            }
        }
    }
}
