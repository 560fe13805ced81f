//! Sigstore golden-measurement fetcher.
//!
//! Tinfoil publishes signed build measurements as GitHub attestations.
//! The fetch is content-addressed in three steps: latest release tag →
//! `tinfoil.hash` digest → attestation bundle for that digest. The
//! bundle's DSSE envelope payload is a base64 in-toto statement whose
//! predicate carries the measurements.
//!
//! Any HTTP failure yields empty golden values, which downstream policy
//! treats as a mismatch (fail-closed). Decoded predicates are cached per
//! repo for the process lifetime.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Error;

pub const GITHUB_PROXY_URL: &str = "https://api-github-proxy.tinfoil.sh";
pub const ATTESTATION_PROXY_URL: &str = "https://gh-attestation-proxy.tinfoil.sh";

/// Repository publishing the per-machine-profile MRTD/RTMR0 measurements.
pub const HARDWARE_MEASUREMENTS_REPO: &str = "tinfoilsh/hardware-measurements";

pub const PREDICATE_SNP_TDX_MULTIPLATFORM: &str =
    "https://tinfoil.sh/predicate/snp-tdx-multiplatform/v1";
pub const PREDICATE_HARDWARE_MEASUREMENTS: &str =
    "https://tinfoil.sh/predicate/hardware-measurements/v1";

/// Golden image measurements (RTMR1/RTMR2) for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoldenImage {
    pub rtmr1: Option<String>,
    pub rtmr2: Option<String>,
}

/// Golden hardware measurements (MRTD/RTMR0) for one machine profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareProfile {
    pub mrtd: Option<String>,
    pub rtmr0: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SigstoreClient {
    github_proxy: String,
    attestation_proxy: String,
    http: reqwest::Client,
    // Keyed by repo; bundles are immutable once published, so no eviction.
    cache: Arc<Mutex<HashMap<String, Value>>>,
}

impl Default for SigstoreClient {
    fn default() -> Self {
        Self::new(GITHUB_PROXY_URL, ATTESTATION_PROXY_URL)
    }
}

impl SigstoreClient {
    pub fn new(github_proxy: impl Into<String>, attestation_proxy: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            github_proxy: github_proxy.into().trim_end_matches('/').to_string(),
            attestation_proxy: attestation_proxy.into().trim_end_matches('/').to_string(),
            http,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Golden RTMR1/RTMR2 for a repo's latest release image. Empty on any
    /// fetch failure or unexpected predicate type.
    pub async fn golden_image(&self, repo: &str) -> GoldenImage {
        let statement = match self.fetch_statement(repo).await {
            Ok(statement) => statement,
            Err(e) => {
                tracing::warn!("Failed to fetch Sigstore bundle for {}: {}", repo, e);
                return GoldenImage::default();
            }
        };

        if statement.get("predicateType").and_then(Value::as_str)
            != Some(PREDICATE_SNP_TDX_MULTIPLATFORM)
        {
            return GoldenImage::default();
        }

        let tdx = &statement["predicate"]["tdx_measurement"];
        GoldenImage {
            rtmr1: tdx.get("rtmr1").and_then(Value::as_str).map(String::from),
            rtmr2: tdx.get("rtmr2").and_then(Value::as_str).map(String::from),
        }
    }

    /// Golden MRTD/RTMR0 per hardware profile, from the shared
    /// hardware-measurements repo. Empty on any fetch failure.
    pub async fn hardware_profiles(&self) -> HashMap<String, HardwareProfile> {
        let statement = match self.fetch_statement(HARDWARE_MEASUREMENTS_REPO).await {
            Ok(statement) => statement,
            Err(e) => {
                tracing::warn!("Failed to fetch hardware measurements: {}", e);
                return HashMap::new();
            }
        };

        if statement.get("predicateType").and_then(Value::as_str)
            != Some(PREDICATE_HARDWARE_MEASUREMENTS)
        {
            return HashMap::new();
        }

        let mut profiles = HashMap::new();
        if let Some(predicate) = statement.get("predicate").and_then(Value::as_object) {
            for (name, values) in predicate {
                profiles.insert(
                    name.clone(),
                    HardwareProfile {
                        mrtd: values.get("mrtd").and_then(Value::as_str).map(String::from),
                        rtmr0: values
                            .get("rtmr0")
                            .and_then(Value::as_str)
                            .map(String::from),
                    },
                );
            }
        }
        profiles
    }

    /// Fetch and DSSE-decode the in-toto statement for a repo's latest
    /// release, with per-repo caching.
    async fn fetch_statement(&self, repo: &str) -> Result<Value, Error> {
        if let Some(cached) = self.cache.lock().unwrap().get(repo) {
            return Ok(cached.clone());
        }

        // 1. Latest release tag.
        let release: Value = self
            .get_json(&format!(
                "{}/repos/{}/releases/latest",
                self.github_proxy, repo
            ))
            .await?;
        let tag = release
            .get("tag_name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Provider(format!("no tag_name in latest release of {}", repo)))?;

        // 2. Content digest for the release artifacts.
        let digest = self
            .get_text(&format!(
                "{}/{}/releases/download/{}/tinfoil.hash",
                self.github_proxy, repo, tag
            ))
            .await?
            .trim()
            .to_string();

        // 3. Attestation bundle addressed by that digest.
        let attestations: Value = self
            .get_json(&format!(
                "{}/repos/{}/attestations/sha256:{}",
                self.attestation_proxy, repo, digest
            ))
            .await?;

        let bundle = attestations
            .get("attestations")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(|att| att.get("bundle"))
            .ok_or_else(|| Error::Provider(format!("no attestation bundle for {}", repo)))?;

        let statement = decode_dsse_payload(bundle)?;

        // Identical writers; last-writer-wins is fine.
        self.cache
            .lock()
            .unwrap()
            .insert(repo.to_string(), statement.clone());
        Ok(statement)
    }

    async fn get_json(&self, url: &str) -> Result<Value, Error> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_text(&self, url: &str) -> Result<String, Error> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Decode `bundle.dsseEnvelope.payload` (base64 JSON in-toto statement).
fn decode_dsse_payload(bundle: &Value) -> Result<Value, Error> {
    let payload_b64 = bundle
        .get("dsseEnvelope")
        .and_then(|e| e.get("payload"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Provider("bundle has no dsseEnvelope.payload".to_string()))?;
    let payload = STANDARD
        .decode(payload_b64)
        .map_err(|e| Error::Provider(format!("invalid DSSE payload base64: {}", e)))?;
    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dsse_payload() {
        let statement = serde_json::json!({
            "predicateType": PREDICATE_SNP_TDX_MULTIPLATFORM,
            "predicate": {"tdx_measurement": {"rtmr1": "aa", "rtmr2": "bb"}},
        });
        let bundle = serde_json::json!({
            "dsseEnvelope": {
                "payload": STANDARD.encode(serde_json::to_vec(&statement).unwrap()),
            }
        });
        assert_eq!(decode_dsse_payload(&bundle).unwrap(), statement);
    }

    #[test]
    fn test_decode_dsse_payload_rejects_missing_envelope() {
        assert!(decode_dsse_payload(&serde_json::json!({})).is_err());
        assert!(decode_dsse_payload(&serde_json::json!({
            "dsseEnvelope": {"payload": "!!not-base64!!"}
        }))
        .is_err());
    }
}
