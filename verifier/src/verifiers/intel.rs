//! Baseline Intel TDX verification.
//!
//! Glues the DCAP oracle and the quote parser into a verdict with claims.
//! When DCAP fails, the raw quote is still parsed best-effort so that
//! policy layers (and humans) can inspect the measurement registers; the
//! claims then carry `status: "Error"` plus the DCAP error string.

use crate::config::Settings;
use crate::ita::ItaClient;
use crate::types::{HardwareType, QuoteInput, VerificationResult};
use crate::{dcap, quote};

#[derive(Debug, Clone, Default)]
pub struct IntelTdxVerifier {
    ita: Option<ItaClient>,
}

impl IntelTdxVerifier {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ita: settings
                .ita_api_key
                .as_ref()
                .map(|key| ItaClient::new(key.clone())),
        }
    }

    pub async fn verify(&self, input: &QuoteInput) -> VerificationResult {
        let mut result = VerificationResult::new("intel");
        result.hardware_type = vec![HardwareType::IntelTdx];
        result.model_id = input.model_id.clone();

        let quote_bytes = match hex::decode(input.quote_hex.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                result.error = Some(format!("Invalid quote hex: {}", e));
                return result;
            }
        };

        match dcap::verify_quote(&quote_bytes).await {
            Ok(verdict) => {
                result
                    .claims
                    .insert("status".into(), verdict.status.clone().into());
                result.claims.insert(
                    "advisory_ids".into(),
                    serde_json::json!(verdict.advisory_ids),
                );
                verdict.body.insert_claims(&mut result.claims);

                if verdict.accepted {
                    result.model_verified = true;
                } else {
                    result.error = Some(format!(
                        "Verification failed with status: {}",
                        verdict.status
                    ));
                }
            }
            Err(e) => {
                // Best effort: keep the registers available for policy
                // diagnostics even though the quote did not verify.
                if let Ok(body) = quote::parse_quote(&quote_bytes) {
                    body.insert_claims(&mut result.claims);
                }
                result.claims.insert("status".into(), "Error".into());
                result.error = Some(format!("Verification failed: {}", e));
            }
        }

        if let Some(repo) = &input.repo {
            result.claims.insert("repo".into(), repo.clone().into());
        }

        // Optional Intel Trust Authority appraisal; claims-only, silent on
        // failure.
        if let Some(ita) = &self.ita {
            if let Some(ita_claims) = ita.appraise(&quote_bytes).await {
                result.claims.insert(
                    "intel_trust_authority".into(),
                    serde_json::Value::Object(ita_claims),
                );
            }
        }

        result
    }
}
