//! Redpill model verification routing.
//!
//! Redpill resells models hosted on different confidential backends. The
//! model catalog entry decides the pipeline: Tinfoil-distributed models go
//! through the Tinfoil policy verifier, NearAI-distributed ones through
//! the NearAI composite, and Phala-hosted ones (the default) through the
//! Phala composite plus a report-data binding check against the quote
//! returned by the Redpill API.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::{ModelConfig, Settings};
use crate::quote::extract_report_data_hex;
use crate::report_data::verify_report_data;
use crate::types::{parse_if_string, QuoteInput, VerificationResult};
use crate::verifiers::nearai::NearAiVerifier;
use crate::verifiers::phala::PhalaVerifier;
use crate::verifiers::tinfoil::TinfoilVerifier;

pub const REDPILL_API: &str = "https://api.redpill.ai/v1";

/// Flattened Redpill report: the envelope fields plus the raw passthrough
/// from the Redpill attestation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedpillEvidence {
    #[serde(default, alias = "model")]
    pub model_id: Option<String>,
    #[serde(default)]
    pub intel_quote: Option<String>,
    #[serde(default)]
    pub nvidia_payload: Option<Value>,
    #[serde(default)]
    pub signing_address: Option<String>,
    #[serde(default)]
    pub request_nonce: Option<String>,
    #[serde(default)]
    pub raw: Option<Value>,
}

/// One entry of the Redpill `/models` catalog.
#[derive(Debug, Clone, Deserialize)]
struct CatalogModel {
    id: String,
    #[serde(default)]
    providers: Vec<String>,
    #[serde(default)]
    metadata: Value,
}

#[derive(Debug, Clone)]
pub struct RedpillVerifier {
    api_base: String,
    http: reqwest::Client,
    config: ModelConfig,
    tinfoil: TinfoilVerifier,
    nearai: NearAiVerifier,
    phala: PhalaVerifier,
}

impl RedpillVerifier {
    pub fn new(settings: &Settings, config: ModelConfig) -> Self {
        Self::with_parts(
            REDPILL_API,
            config,
            TinfoilVerifier::new(settings),
            NearAiVerifier::new(settings),
            PhalaVerifier::new(settings),
        )
    }

    pub fn with_parts(
        api_base: impl Into<String>,
        config: ModelConfig,
        tinfoil: TinfoilVerifier,
        nearai: NearAiVerifier,
        phala: PhalaVerifier,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
            config,
            tinfoil,
            nearai,
            phala,
        }
    }

    pub async fn verify(&self, evidence: &RedpillEvidence) -> VerificationResult {
        let Some(model_id) = evidence.model_id.as_deref() else {
            return VerificationResult::failed("redpill", "Missing model_id in report data");
        };

        let Some(model) = self.lookup_model(model_id).await else {
            let mut result = VerificationResult::failed(
                "redpill",
                format!("Could not find model info for model {}", model_id),
            );
            result.claims.insert("model_id".into(), model_id.into());
            return result;
        };

        if model.providers.iter().any(|p| p == "tinfoil") {
            return self.verify_via_tinfoil(model_id, evidence).await;
        }
        if model.providers.iter().any(|p| p == "near-ai") {
            return self.verify_via_nearai(model_id, evidence).await;
        }
        if model.providers.is_empty() || model.providers.iter().any(|p| p == "phala") {
            return self.verify_via_phala(model_id, &model, evidence).await;
        }

        let mut result = VerificationResult::failed(
            "redpill",
            format!(
                "Model provided by {:?} is not verifiable",
                model.providers
            ),
        );
        result.claims.insert("model_id".into(), model_id.into());
        result
            .claims
            .insert("providers".into(), serde_json::json!(model.providers));
        result
    }

    async fn verify_via_tinfoil(
        &self,
        model_id: &str,
        evidence: &RedpillEvidence,
    ) -> VerificationResult {
        let Some(tinfoil_id) = self.config.tinfoil_model_for(model_id) else {
            let mut result = VerificationResult::failed(
                "redpill",
                format!("No Tinfoil mapping for model {}", model_id),
            );
            result.claims.insert("model_id".into(), model_id.into());
            return result;
        };

        let input = QuoteInput {
            quote_hex: evidence.intel_quote.clone().unwrap_or_default(),
            model_id: Some(tinfoil_id.clone()),
            repo: self.config.repo(&tinfoil_id).map(String::from),
            request_nonce: evidence.request_nonce.clone(),
            signing_address: evidence.signing_address.clone(),
        };
        let mut result = self.tinfoil.verify(&input).await;
        result
            .claims
            .insert("redpill_model_id".into(), model_id.into());
        result
            .claims
            .insert("model_provider".into(), "tinfoil".into());
        result
    }

    async fn verify_via_nearai(
        &self,
        model_id: &str,
        evidence: &RedpillEvidence,
    ) -> VerificationResult {
        let Some(nearai_id) = self.config.nearai_model_for(model_id) else {
            let mut result = VerificationResult::failed(
                "redpill",
                format!("No NearAI mapping for model {}", model_id),
            );
            result.claims.insert("model_id".into(), model_id.into());
            return result;
        };

        // The NearAI composite expects the raw NearAI report. When resold
        // via Redpill only the first model attestation counts.
        let mut raw = evidence.raw.clone().unwrap_or(Value::Null);
        if let Some(Value::Array(attestations)) = raw.get_mut("model_attestations") {
            attestations.truncate(1);
        }

        let mut result = self.nearai.verify(&raw, None).await;
        result
            .claims
            .insert("redpill_model_id".into(), model_id.into());
        result
            .claims
            .insert("nearai_model_id".into(), nearai_id.into());
        result
            .claims
            .insert("model_provider".into(), "nearai".into());
        result
    }

    async fn verify_via_phala(
        &self,
        model_id: &str,
        model: &CatalogModel,
        evidence: &RedpillEvidence,
    ) -> VerificationResult {
        let Some(app_id) = model
            .metadata
            .get("appid")
            .and_then(Value::as_str)
            .map(String::from)
        else {
            let mut result = VerificationResult::failed(
                "redpill",
                format!("Could not find Phala app_id for model {}", model_id),
            );
            result.claims.insert("model_id".into(), model_id.into());
            return result;
        };

        let nvidia_payload = evidence.nvidia_payload.as_ref().map(parse_if_string);
        let mut result = self
            .phala
            .verify(&app_id, None, nvidia_payload.as_ref())
            .await;

        result.claims.insert("model_id".into(), model_id.into());
        result.claims.insert("app_id".into(), app_id.into());
        result
            .claims
            .insert("model_provider".into(), "phala".into());

        if !result.model_verified {
            return result;
        }

        // Bind the Redpill-returned quote to the caller's nonce and the
        // response-signing address.
        let report_data_hex = evidence
            .intel_quote
            .as_deref()
            .and_then(extract_report_data_hex);
        if let (Some(report_data_hex), Some(nonce), Some(address)) = (
            report_data_hex,
            evidence.request_nonce.as_deref(),
            evidence.signing_address.as_deref(),
        ) {
            let check = verify_report_data(&report_data_hex, address, nonce);
            result.claims.insert(
                "report_data_check".into(),
                serde_json::to_value(&check).unwrap_or(Value::Null),
            );

            if !check.valid {
                result.model_verified = false;
                result.error = Some(format!(
                    "Report data binding failed: {}",
                    check.error.as_deref().unwrap_or("Address/Nonce mismatch")
                ));
                return result;
            }

            result.claims.insert("nonce_verified".into(), true.into());
            result
                .claims
                .insert("signing_address_verified".into(), true.into());
            result
                .claims
                .insert("request_nonce".into(), nonce.into());
            result
                .claims
                .insert("signing_address".into(), address.into());
            result.request_nonce = Some(nonce.to_string());
            result.signing_address = Some(address.to_string());
        }

        result
    }

    /// Look up one model in the Redpill catalog. Catalog fetch failures
    /// are logged and treated as a miss.
    async fn lookup_model(&self, model_id: &str) -> Option<CatalogModel> {
        let url = format!("{}/models", self.api_base);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to fetch Redpill models: {}", e);
                return None;
            }
        };
        let data = match response.json::<Value>().await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Failed to parse Redpill models response: {}", e);
                return None;
            }
        };

        let models = data
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        models.into_iter().find_map(|entry| {
            let model: CatalogModel = serde_json::from_value(entry).ok()?;
            (model.id == model_id).then_some(model)
        })
    }
}
