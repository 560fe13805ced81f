//! NearAI cloud verification.
//!
//! A NearAI attestation report carries a gateway attestation plus one or
//! more model attestations. Every component goes through the same checks:
//! dstack environment verification, compose-hash comparison, report-data
//! binding against the shared request nonce and signing address, and an
//! optional GPU attestation whose evidence must carry the same nonce.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::dstack::DstackClient;
use crate::nvidia::NvidiaClient;
use crate::report_data::verify_report_data;
use crate::types::{parse_if_string, to_wire_string, HardwareType, VerificationResult};

const GATEWAY_COMPONENT: &str = "gateway";
const MODEL_COMPONENT: &str = "model";

#[derive(Debug, Clone)]
pub struct NearAiVerifier {
    dstack: DstackClient,
    nvidia: NvidiaClient,
}

struct ComponentOutcome {
    is_valid: bool,
    has_gpu: bool,
    errors: Vec<String>,
    details: Map<String, Value>,
}

impl NearAiVerifier {
    pub fn new(settings: &Settings) -> Self {
        Self::with_clients(
            DstackClient::new(&settings.dstack_verifier_url),
            NvidiaClient::default(),
        )
    }

    pub fn with_clients(dstack: DstackClient, nvidia: NvidiaClient) -> Self {
        Self { dstack, nvidia }
    }

    /// Verify a NearAI report (`gateway_attestation` +
    /// `model_attestations[]`). The request nonce comes from the caller,
    /// falling back to the one recorded in the gateway attestation.
    pub async fn verify(&self, report: &Value, request_nonce: Option<&str>) -> VerificationResult {
        let Some(gateway) = report.get("gateway_attestation") else {
            return VerificationResult::failed("nearai", "Missing gateway_attestation");
        };

        let request_nonce = request_nonce
            .map(String::from)
            .or_else(|| {
                gateway
                    .get("request_nonce")
                    .and_then(Value::as_str)
                    .map(String::from)
            });

        let mut components = Map::new();
        let mut errors = Vec::new();
        let mut all_valid = true;
        let mut has_gpu = false;

        let gateway_outcome = self
            .verify_component(GATEWAY_COMPONENT, gateway, request_nonce.as_deref())
            .await;
        merge_outcome(
            GATEWAY_COMPONENT,
            gateway_outcome,
            &mut components,
            &mut errors,
            &mut all_valid,
            &mut has_gpu,
        );

        let model_attestations = report
            .get("model_attestations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for (i, model) in model_attestations.iter().enumerate() {
            let name = if i == 0 {
                MODEL_COMPONENT.to_string()
            } else {
                format!("{}-{}", MODEL_COMPONENT, i)
            };
            let outcome = self
                .verify_component(&name, model, request_nonce.as_deref())
                .await;
            merge_outcome(
                &name,
                outcome,
                &mut components,
                &mut errors,
                &mut all_valid,
                &mut has_gpu,
            );
        }

        let mut result = VerificationResult::new("nearai");
        result.model_verified = all_valid;
        result.request_nonce = request_nonce.clone();
        result.signing_address = gateway
            .get("signing_address")
            .and_then(Value::as_str)
            .map(String::from);

        // The set reports attested hardware types, not verdicts: a GPU
        // verdict (pass or fail) means NVIDIA CC hardware was in play.
        result.hardware_type = vec![HardwareType::IntelTdx];
        if has_gpu {
            result.add_hardware(HardwareType::NvidiaCc);
        }

        result
            .claims
            .insert("components".into(), Value::Object(components));
        if let Some(nonce) = &request_nonce {
            result
                .claims
                .insert("request_nonce".into(), nonce.clone().into());
        }
        if let Some(address) = &result.signing_address {
            result
                .claims
                .insert("signing_address".into(), address.clone().into());
        }

        if !errors.is_empty() {
            result.error = Some(errors.join("; "));
        }
        result
    }

    async fn verify_component(
        &self,
        name: &str,
        attestation: &Value,
        request_nonce: Option<&str>,
    ) -> ComponentOutcome {
        let mut outcome = ComponentOutcome {
            is_valid: false,
            has_gpu: false,
            errors: Vec::new(),
            details: Map::new(),
        };

        let quote = attestation
            .get("intel_quote")
            .and_then(Value::as_str)
            .unwrap_or("");
        let event_log = attestation
            .get("event_log")
            .map(to_wire_string)
            .unwrap_or_default();

        let info = attestation.get("info").cloned().unwrap_or_default();
        let tcb_info = info.get("tcb_info").map(parse_if_string).unwrap_or_default();
        let app_compose = tcb_info
            .get("app_compose")
            .and_then(Value::as_str)
            .map(String::from);
        // vm_config lives next to tcb_info in newer reports, inside it in
        // older ones.
        let vm_config = info
            .get("vm_config")
            .filter(|v| !v.is_null())
            .or_else(|| tcb_info.get("vm_config").filter(|v| !v.is_null()))
            .map(to_wire_string)
            .unwrap_or_default();

        // 1. dstack environment verification.
        let dstack = self.dstack.verify(quote, &event_log, &vm_config).await;
        let dstack_valid = dstack.is_valid;
        if !dstack_valid {
            outcome.errors.push(format!(
                "Dstack verification failed: {}",
                dstack.reason.as_deref().unwrap_or("unknown")
            ));
        }

        // 2. Compose-hash comparison.
        let reported_compose_hash = info.get("compose_hash").and_then(Value::as_str);
        let mut compose_verified = false;
        if let (Some(app_compose), Some(expected)) = (&app_compose, reported_compose_hash) {
            let actual = hex::encode(Sha256::digest(app_compose.as_bytes()));
            compose_verified = actual.eq_ignore_ascii_case(expected);
            if !compose_verified {
                outcome.errors.push("Compose hash mismatch".to_string());
            }
        }
        outcome
            .details
            .insert("compose_verified".into(), compose_verified.into());

        // 3. Report-data binding (signing address + request nonce).
        let signing_address = attestation.get("signing_address").and_then(Value::as_str);
        if let (Some(report_data_hex), Some(nonce), Some(address)) =
            (dstack.report_data.as_deref(), request_nonce, signing_address)
        {
            let check = verify_report_data(report_data_hex, address, nonce);
            if !check.valid {
                outcome.errors.push(format!(
                    "Report data check failed: {}",
                    check.error.as_deref().unwrap_or("mismatch")
                ));
            }
            outcome.details.insert(
                "report_data_check".into(),
                serde_json::to_value(&check).unwrap_or(Value::Null),
            );
        }

        outcome.details.insert(
            "dstack".into(),
            serde_json::to_value(&DstackDetails::from(&dstack)).unwrap_or(Value::Null),
        );

        // 4. GPU attestation, nonce-bound to the request.
        if let Some(payload) = attestation.get("nvidia_payload").filter(|v| !v.is_null()) {
            let payload = parse_if_string(payload);
            outcome.has_gpu = true;

            let gpu_nonce = payload.get("nonce").and_then(Value::as_str);
            if let (Some(expected), Some(got)) = (request_nonce, gpu_nonce) {
                if !expected.eq_ignore_ascii_case(got) {
                    outcome.errors.push(format!(
                        "GPU nonce mismatch: expected {}, got {}",
                        expected, got
                    ));
                }
            }

            let gpu_result = self.nvidia.verify(&payload).await;
            if !gpu_result.model_verified {
                outcome.errors.push(format!(
                    "GPU verification failed: {}",
                    gpu_result.error.as_deref().unwrap_or("unknown")
                ));
            }
            outcome.details.insert(
                "gpu".into(),
                serde_json::to_value(&gpu_result).unwrap_or(Value::Null),
            );
        }

        outcome.is_valid = outcome.errors.is_empty() && dstack_valid;
        if !outcome.is_valid {
            tracing::warn!(
                component = name,
                errors = ?outcome.errors,
                "NearAI component failed verification"
            );
        }
        outcome
    }
}

/// dstack verdict subset recorded per component (the raw quote stays out
/// of the claims).
#[derive(serde::Serialize)]
struct DstackDetails {
    is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_data: Option<String>,
    details: Map<String, Value>,
}

impl From<&crate::dstack::DstackVerdict> for DstackDetails {
    fn from(verdict: &crate::dstack::DstackVerdict) -> Self {
        Self {
            is_valid: verdict.is_valid,
            reason: verdict.reason.clone(),
            report_data: verdict.report_data.clone(),
            details: verdict.details.clone(),
        }
    }
}

fn merge_outcome(
    name: &str,
    outcome: ComponentOutcome,
    components: &mut Map<String, Value>,
    errors: &mut Vec<String>,
    all_valid: &mut bool,
    has_gpu: &mut bool,
) {
    if !outcome.is_valid {
        *all_valid = false;
    }
    if outcome.has_gpu {
        *has_gpu = true;
    }
    errors.extend(outcome.errors.iter().cloned());

    let mut entry = Map::new();
    entry.insert("is_valid".into(), outcome.is_valid.into());
    if !outcome.errors.is_empty() {
        entry.insert("errors".into(), serde_json::json!(outcome.errors));
    }
    entry.insert("details".into(), Value::Object(outcome.details));
    components.insert(name.to_string(), Value::Object(entry));
}
