//! The verification facade.
//!
//! `TeeVerifier` owns one instance of every provider client and verifier
//! pipeline, dispatches incoming reports on their provider tag, and merges
//! the optional GPU verdict for paths that do not verify GPU evidence
//! themselves. Construct it once per process; the model map and Sigstore
//! caches live behind it.

use anyhow::Result;
use serde_json::Value;

use crate::config::{ModelConfig, Settings};
use crate::error::Error;
use crate::nvidia::NvidiaClient;
use crate::providers::{NearaiProvider, RedpillProvider, TinfoilProvider};
use crate::types::{
    parse_if_string, AttestationReport, HardwareType, Provider, QuoteInput, VerificationResult,
};
use crate::verifiers::{
    IntelTdxVerifier, NearAiVerifier, RedpillEvidence, RedpillVerifier, TinfoilVerifier,
};

pub struct TeeVerifier {
    intel: IntelTdxVerifier,
    tinfoil: TinfoilVerifier,
    redpill: RedpillVerifier,
    nearai: NearAiVerifier,
    nvidia: NvidiaClient,
    tinfoil_provider: TinfoilProvider,
    redpill_provider: RedpillProvider,
    nearai_provider: NearaiProvider,
}

impl TeeVerifier {
    /// Build from environment settings and the cached YAML model map.
    pub fn new() -> Result<Self> {
        let settings = Settings::from_env()?;
        let config = ModelConfig::global().clone();
        Ok(Self::with_settings(&settings, config))
    }

    pub fn with_settings(settings: &Settings, config: ModelConfig) -> Self {
        Self {
            intel: IntelTdxVerifier::new(settings),
            tinfoil: TinfoilVerifier::new(settings),
            redpill: RedpillVerifier::new(settings, config.clone()),
            nearai: NearAiVerifier::new(settings),
            nvidia: NvidiaClient::default(),
            tinfoil_provider: TinfoilProvider::new(config),
            redpill_provider: RedpillProvider::default(),
            nearai_provider: NearaiProvider::default(),
        }
    }

    /// Replace the verifier pipelines (tests wire in stub endpoints here).
    pub fn with_pipelines(
        mut self,
        tinfoil: TinfoilVerifier,
        redpill: RedpillVerifier,
        nearai: NearAiVerifier,
        nvidia: NvidiaClient,
    ) -> Self {
        self.tinfoil = tinfoil;
        self.redpill = redpill;
        self.nearai = nearai;
        self.nvidia = nvidia;
        self
    }

    pub fn list_providers(&self) -> Vec<&'static str> {
        vec!["tinfoil", "redpill", "nearai"]
    }

    pub async fn list_models(&self, provider: Provider) -> Result<Vec<String>, Error> {
        match provider {
            Provider::Tinfoil => Ok(self.tinfoil_provider.list_models()),
            Provider::Redpill => self.redpill_provider.list_models().await,
            Provider::Nearai => self.nearai_provider.list_models().await,
            Provider::Generic => Err(Error::LookupMiss("Unknown provider".to_string())),
        }
    }

    /// Fetch a fresh attestation report from a provider endpoint.
    pub async fn fetch_report(
        &self,
        provider: Provider,
        model_id: &str,
    ) -> Result<AttestationReport, Error> {
        match provider {
            Provider::Tinfoil => self.tinfoil_provider.fetch_report(model_id).await,
            Provider::Redpill => self.redpill_provider.fetch_report(model_id).await,
            Provider::Nearai => self.nearai_provider.fetch_report(model_id).await,
            Provider::Generic => Err(Error::LookupMiss("Unknown provider".to_string())),
        }
    }

    /// Fetch a report from a provider and verify it.
    pub async fn verify_model(
        &self,
        provider: Provider,
        model_id: &str,
    ) -> Result<VerificationResult, Error> {
        let report = self.fetch_report(provider, model_id).await?;
        Ok(self.verify(&report).await)
    }

    /// Verify an attestation report, dispatching on its provider tag.
    pub async fn verify(&self, report: &AttestationReport) -> VerificationResult {
        let input = self.quote_input(report);

        // NearAI and Redpill pipelines own their GPU evidence handling;
        // the other paths get the NRAS check merged in below.
        let (mut result, gpu_checked) = match report.provider {
            Provider::Nearai => {
                let raw = report.raw.clone().unwrap_or(Value::Null);
                let mut result = self
                    .nearai
                    .verify(&raw, report.request_nonce.as_deref())
                    .await;
                if result.model_id.is_none() {
                    result.model_id = input.model_id.clone();
                }
                (result, true)
            }
            Provider::Redpill => {
                let evidence = redpill_evidence(report);
                (self.redpill.verify(&evidence).await, true)
            }
            Provider::Tinfoil => (self.tinfoil.verify(&input).await, false),
            Provider::Generic => (self.intel.verify(&input).await, false),
        };

        result.provider = report.provider.as_str().to_string();
        if result.request_nonce.is_none() {
            result.request_nonce = report.request_nonce.clone();
        }

        if let (Some(payload), false) = (&report.nvidia_payload, gpu_checked) {
            let gpu = self.nvidia.verify(&parse_if_string(payload)).await;
            // A GPU verdict (pass or fail) means NVIDIA CC hardware was
            // attested; a failing one adds diagnostics without masking the
            // TDX verdict.
            result.add_hardware(HardwareType::NvidiaCc);
            if !gpu.model_verified {
                if let Some(gpu_error) = &gpu.error {
                    result.push_error(format!("GPU verification failed: {}", gpu_error));
                }
            }
            result
                .claims
                .insert("nvidia".into(), Value::Object(gpu.claims));
        }

        result
    }

    /// Wrap the report's quote with its binding metadata so every
    /// downstream verifier sees the same bundle.
    fn quote_input(&self, report: &AttestationReport) -> QuoteInput {
        let raw_str = |key: &str| -> Option<String> {
            report
                .raw
                .as_ref()?
                .get(key)?
                .as_str()
                .map(String::from)
        };
        QuoteInput {
            quote_hex: report.intel_quote.clone(),
            model_id: report.model_id.clone().or_else(|| raw_str("model_id")),
            repo: raw_str("repo"),
            request_nonce: report.request_nonce.clone(),
            signing_address: raw_str("signing_address"),
        }
    }
}

/// Flatten an attestation report into the Redpill router's evidence shape:
/// raw fields first, envelope fields winning where both exist.
fn redpill_evidence(report: &AttestationReport) -> RedpillEvidence {
    let mut evidence = report
        .raw
        .clone()
        .and_then(|raw| serde_json::from_value::<RedpillEvidence>(raw).ok())
        .unwrap_or_default();

    evidence.raw = report.raw.clone();
    evidence.intel_quote = Some(report.intel_quote.clone());
    if report.model_id.is_some() {
        evidence.model_id = report.model_id.clone();
    }
    if report.request_nonce.is_some() {
        evidence.request_nonce = report.request_nonce.clone();
    }
    if report.nvidia_payload.is_some() {
        evidence.nvidia_payload = report.nvidia_payload.clone();
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redpill_evidence_flattens_raw() {
        let report = AttestationReport {
            provider: Provider::Redpill,
            model_id: Some("acme/model".to_string()),
            intel_quote: "0400".to_string(),
            request_nonce: Some("aa".repeat(32)),
            nvidia_payload: None,
            raw: Some(serde_json::json!({
                "signing_address": "0x1234",
                "intel_quote": "ffff",
                "nvidia_payload": {"nonce": "bb"},
            })),
        };
        let evidence = redpill_evidence(&report);
        // Envelope quote wins over the raw copy.
        assert_eq!(evidence.intel_quote.as_deref(), Some("0400"));
        assert_eq!(evidence.model_id.as_deref(), Some("acme/model"));
        assert_eq!(evidence.signing_address.as_deref(), Some("0x1234"));
        assert_eq!(evidence.request_nonce.as_deref(), Some("aa".repeat(32).as_str()));
        assert_eq!(evidence.nvidia_payload.unwrap()["nonce"], "bb");
    }
}
