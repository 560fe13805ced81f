//! Phala Cloud app verification.
//!
//! A deployed Phala app spans up to three TEE-resident components: the
//! model VM itself, the key management service, and the gateway. Each one
//! is verified through the external dstack-verifier and has its attested
//! docker-compose hash checked against the app_compose document. The
//! overall verdict is the conjunction of the component verdicts.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::Settings;
use crate::dstack::DstackClient;
use crate::error::Error;
use crate::nvidia::NvidiaClient;
use crate::types::{
    parse_if_string, to_wire_string, ComponentVerdict, HardwareType, VerificationResult,
};

pub const PHALA_CLOUD_API: &str = "https://cloud-api.phala.network";

const MODEL_COMPONENT: &str = "model";
const KMS_COMPONENT: &str = "key management service";
const GATEWAY_COMPONENT: &str = "gateway";

/// One sub-component's verification inputs, assembled from the system-info
/// document before fan-out.
struct Candidate {
    name: &'static str,
    quote: Option<String>,
    event_log: Option<Value>,
    vm_config: Option<Value>,
    app_compose: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PhalaVerifier {
    cloud_api_base: String,
    dstack: DstackClient,
    nvidia: NvidiaClient,
    http: reqwest::Client,
}

impl PhalaVerifier {
    pub fn new(settings: &Settings) -> Self {
        Self::with_endpoints(
            PHALA_CLOUD_API,
            DstackClient::new(&settings.dstack_verifier_url),
            NvidiaClient::default(),
        )
    }

    pub fn with_endpoints(
        cloud_api_base: impl Into<String>,
        dstack: DstackClient,
        nvidia: NvidiaClient,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            cloud_api_base: cloud_api_base.into().trim_end_matches('/').to_string(),
            dstack,
            nvidia,
            http,
        }
    }

    /// Fetch the app's attestation bundle from the Phala Cloud API.
    pub async fn fetch_system_info(&self, app_id: &str) -> Result<Value, Error> {
        let url = format!(
            "{}/api/v1/apps/{}/attestations",
            self.cloud_api_base, app_id
        );
        tracing::info!("Fetching Phala system info from {}", url);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Verify a Phala Cloud app by fanning out over its components.
    ///
    /// `system_info` can be supplied directly (pre-fetched reports); when
    /// absent it is fetched from the Phala Cloud API.
    pub async fn verify(
        &self,
        app_id: &str,
        system_info: Option<Value>,
        nvidia_payload: Option<&Value>,
    ) -> VerificationResult {
        let system_info = match system_info {
            Some(info) => info,
            None => match self.fetch_system_info(app_id).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::error!("Failed to fetch system info for app {}: {}", app_id, e);
                    return VerificationResult::failed("phala", e.to_string());
                }
            },
        };

        let Some(instance) = system_info
            .get("instances")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
        else {
            return VerificationResult::failed("phala", "No instances found for this app.");
        };

        // Authoritative AppInfo for the main app comes from the
        // provisioning-RPC endpoint; the system-info vm_config is the
        // fallback when that call fails.
        let (mut main_vm_config, main_app_compose) = self.fetch_main_app_info(app_id, &system_info).await;
        if main_vm_config.is_none() {
            main_vm_config = system_info.get("vm_config").cloned();
        }

        let mut candidates = vec![Candidate {
            name: MODEL_COMPONENT,
            quote: instance
                .get("quote")
                .and_then(Value::as_str)
                .map(String::from),
            event_log: instance.get("eventlog").cloned(),
            vm_config: main_vm_config,
            app_compose: main_app_compose,
        }];

        if let Some(kms) = system_info.get("kms_guest_agent_info") {
            candidates.push(guest_agent_candidate(KMS_COMPONENT, kms));
        }
        if let Some(gateway) = system_info.get("gateway_guest_agent_info") {
            candidates.push(guest_agent_candidate(GATEWAY_COMPONENT, gateway));
        }

        let mut verdicts = Vec::new();
        let mut error_msgs = Vec::new();
        let mut all_valid = true;
        for candidate in candidates {
            let verdict = self.verify_component(candidate).await;
            if !verdict.is_valid {
                all_valid = false;
                error_msgs.push(format!(
                    "{} failed: {}",
                    verdict.name,
                    verdict.reason.as_deref().unwrap_or("unknown")
                ));
            }
            verdicts.push(verdict);
        }

        let gpu_result = match nvidia_payload {
            Some(payload) => Some(self.nvidia.verify(&parse_if_string(payload)).await),
            None => None,
        };

        let mut result = VerificationResult::new("phala");
        result.model_verified = all_valid;
        result.hardware_type = vec![HardwareType::IntelTdx];

        if result.model_verified {
            if let Some(gpu) = &gpu_result {
                if gpu.model_verified {
                    result.add_hardware(HardwareType::NvidiaCc);
                } else if let Some(gpu_error) = &gpu.error {
                    error_msgs.push(format!("GPU verification failed: {}", gpu_error));
                }
            }
        } else if error_msgs.is_empty() {
            error_msgs.push("One or more components failed verification".to_string());
        }

        result
            .claims
            .insert("components".into(), flatten_verdicts(&verdicts));
        result
            .claims
            .insert("phala".into(), phala_metadata(&system_info));
        if let Some(gpu) = gpu_result {
            result
                .claims
                .insert("nvidia".into(), Value::Object(gpu.claims));
        }

        if !error_msgs.is_empty() {
            result.error = Some(error_msgs.join("; "));
        }
        result
    }

    /// POST the provisioning-RPC Info endpoint to get the authoritative
    /// vm_config and app_compose for the main app.
    async fn fetch_main_app_info(
        &self,
        app_id: &str,
        system_info: &Value,
    ) -> (Option<Value>, Option<String>) {
        let Some(kms_url) = system_info
            .get("kms_info")
            .and_then(|k| k.get("url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
        else {
            return (None, None);
        };

        let Some(domain) = kms_base_domain(kms_url) else {
            return (None, None);
        };
        let endpoint = format!("https://{}-8090.{}/prpc/Info", app_id, domain);
        tracing::info!("Fetching authoritative main app info from {}", endpoint);

        let response = match self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({}))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!("Provisioning RPC returned {}", response.status());
                return (None, None);
            }
            Err(e) => {
                tracing::warn!("Provisioning RPC request failed: {}", e);
                return (None, None);
            }
        };

        let Ok(app_info) = response.json::<Value>().await else {
            return (None, None);
        };

        let vm_config = app_info.get("vm_config").cloned();
        // tcb_info in the RPC AppInfo is an escaped JSON string.
        let app_compose = app_info
            .get("tcb_info")
            .map(parse_if_string)
            .and_then(|tcb| {
                tcb.get("app_compose")
                    .and_then(Value::as_str)
                    .map(String::from)
            });
        (vm_config, app_compose)
    }

    async fn verify_component(&self, candidate: Candidate) -> ComponentVerdict {
        let (Some(quote), Some(event_log), Some(vm_config)) = (
            candidate.quote,
            candidate.event_log.filter(|v| !v.is_null()),
            candidate.vm_config.filter(|v| !v.is_null()),
        ) else {
            return ComponentVerdict {
                name: candidate.name.to_string(),
                is_valid: false,
                compose_verified: false,
                reason: Some(
                    "Missing required verification data (quote, event_log, or vm_config)"
                        .to_string(),
                ),
                details: Map::new(),
            };
        };

        let dstack = self
            .dstack
            .verify(
                &quote,
                &to_wire_string(&event_log),
                &to_wire_string(&vm_config),
            )
            .await;

        let mut is_valid = dstack.is_valid;
        let mut compose_verified = true;
        let mut reason = dstack.reason.clone();

        // Compare sha256(app_compose) against the hash attested in the
        // dstack event log.
        if is_valid {
            if let (Some(app_compose), Some(expected)) =
                (&candidate.app_compose, dstack.compose_hash())
            {
                let actual = hex::encode(Sha256::digest(app_compose.as_bytes()));
                if actual != expected {
                    is_valid = false;
                    compose_verified = false;
                    let message = format!(
                        "Compose hash mismatch for {}: expected {}, got {}",
                        candidate.name, expected, actual
                    );
                    tracing::error!("{}", message);
                    reason = Some(message);
                }
            }
        }

        ComponentVerdict {
            name: candidate.name.to_string(),
            is_valid,
            compose_verified,
            reason,
            details: dstack.details,
        }
    }
}

fn guest_agent_candidate(name: &'static str, info: &Value) -> Candidate {
    let tcb = info.get("tcb_info").map(parse_if_string).unwrap_or_default();
    Candidate {
        name,
        quote: info
            .get("app_certificates")
            .and_then(Value::as_array)
            .and_then(|certs| certs.first())
            .and_then(|cert| cert.get("quote"))
            .and_then(Value::as_str)
            .map(String::from),
        event_log: tcb.get("event_log").cloned(),
        vm_config: info.get("vm_config").cloned(),
        app_compose: tcb
            .get("app_compose")
            .and_then(Value::as_str)
            .map(String::from),
    }
}

/// Flatten component verdicts into the claims shape consumers read:
/// `components.<name> = {is_valid, compose_verified, reason?, ...details}`.
/// The raw quote is stripped from the merged dstack details.
fn flatten_verdicts(verdicts: &[ComponentVerdict]) -> Value {
    let mut components = Map::new();
    for verdict in verdicts {
        let mut flat = Map::new();
        flat.insert("is_valid".into(), verdict.is_valid.into());
        flat.insert("compose_verified".into(), verdict.compose_verified.into());
        if let Some(reason) = &verdict.reason {
            flat.insert("reason".into(), reason.clone().into());
        }
        for (key, value) in &verdict.details {
            if key != "quote" {
                flat.insert(key.clone(), value.clone());
            }
        }
        components.insert(verdict.name.clone(), Value::Object(flat));
    }
    Value::Object(components)
}

fn phala_metadata(system_info: &Value) -> Value {
    let image_version = system_info
        .get("instances")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(|instance| instance.get("image_version"))
        .cloned()
        .unwrap_or(Value::Null);
    serde_json::json!({
        "app_id": system_info.get("app_id").cloned().unwrap_or(Value::Null),
        "contract_address": system_info.get("contract_address").cloned().unwrap_or(Value::Null),
        "image_version": image_version,
        "kms_info": system_info.get("kms_info").cloned().unwrap_or(Value::Null),
    })
}

/// Base domain for provisioning-RPC endpoints: the last three labels of the
/// KMS host.
fn kms_base_domain(kms_url: &str) -> Option<String> {
    let url = reqwest::Url::parse(kms_url).ok()?;
    let host = url.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 3 {
        Some(labels[labels.len() - 3..].join("."))
    } else {
        Some(host.to_string())
    }
}
