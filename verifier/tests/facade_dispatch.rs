//! Facade dispatch: each provider tag must route to its own pipeline, and
//! GPU evidence must be merged for paths that do not handle it themselves.

mod common;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use confidential_verifier::config::{ModelConfig, Settings};
use confidential_verifier::dstack::DstackClient;
use confidential_verifier::nvidia::NvidiaClient;
use confidential_verifier::sigstore::SigstoreClient;
use confidential_verifier::verifiers::{
    NearAiVerifier, PhalaVerifier, RedpillVerifier, TinfoilVerifier,
};
use confidential_verifier::{AttestationReport, Provider, TeeVerifier};

use common::{bound_report_data, nras_response, REQUEST_NONCE, SIGNING_ADDRESS};

const APP_COMPOSE: &str = "services:\n  gw: {}\n";

struct Harness {
    verifier: TeeVerifier,
    _dstack: MockServer,
    _nras: MockServer,
    _catalog: MockServer,
}

async fn start_harness() -> Harness {
    let dstack = MockServer::start().await;
    let compose_hash = hex::encode(Sha256::digest(APP_COMPOSE.as_bytes()));
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_valid": true,
            "report_data": hex::encode(bound_report_data()),
            "details": {"app_info": {"compose_hash": compose_hash}},
        })))
        .mount(&dstack)
        .await;

    let nras = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/attest/gpu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nras_response(true)))
        .mount(&nras)
        .await;

    // Empty catalog: every Redpill lookup is a miss, which proves the
    // Redpill pipeline ran.
    let catalog = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&catalog)
        .await;

    let settings = Settings::default();
    let dead = "http://127.0.0.1:1";
    let dead_sigstore = SigstoreClient::new(dead, dead);
    let dstack_client = DstackClient::new(dstack.uri());
    let nvidia = NvidiaClient::new(format!("{}/v3/attest/gpu", nras.uri()));

    let tinfoil = TinfoilVerifier::new(&settings).with_sigstore(dead_sigstore.clone());
    let nearai = NearAiVerifier::with_clients(dstack_client.clone(), nvidia.clone());
    let redpill = RedpillVerifier::with_parts(
        catalog.uri(),
        ModelConfig::default(),
        TinfoilVerifier::new(&settings).with_sigstore(dead_sigstore),
        NearAiVerifier::with_clients(dstack_client.clone(), nvidia.clone()),
        PhalaVerifier::with_endpoints(dead, dstack_client, nvidia.clone()),
    );

    let verifier = TeeVerifier::with_settings(&settings, ModelConfig::default())
        .with_pipelines(tinfoil, redpill, nearai, nvidia);

    Harness {
        verifier,
        _dstack: dstack,
        _nras: nras,
        _catalog: catalog,
    }
}

fn nearai_report() -> AttestationReport {
    let compose_hash = hex::encode(Sha256::digest(APP_COMPOSE.as_bytes()));
    let attestation = json!({
        "intel_quote": "040002008100",
        "event_log": [],
        "info": {
            "tcb_info": {"app_compose": APP_COMPOSE},
            "compose_hash": compose_hash,
            "vm_config": {"cpu_count": 4},
        },
        "signing_address": SIGNING_ADDRESS,
    });
    AttestationReport {
        provider: Provider::Nearai,
        model_id: Some("zai-org/GLM-4.6".to_string()),
        intel_quote: "040002008100".to_string(),
        request_nonce: Some(REQUEST_NONCE.to_string()),
        nvidia_payload: None,
        raw: Some(json!({
            "gateway_attestation": attestation.clone(),
            "model_attestations": [attestation],
        })),
    }
}

#[tokio::test]
async fn nearai_reports_route_to_the_composite() {
    let harness = start_harness().await;
    let result = harness.verifier.verify(&nearai_report()).await;

    assert_eq!(result.provider, "nearai");
    assert!(result.model_verified, "error: {:?}", result.error);
    let components = result.claims["components"].as_object().unwrap();
    assert!(components.contains_key("gateway"));
    assert!(components.contains_key("model"));
}

#[tokio::test]
async fn redpill_reports_route_to_the_router() {
    let harness = start_harness().await;
    let report = AttestationReport {
        provider: Provider::Redpill,
        model_id: Some("acme/model".to_string()),
        intel_quote: "0400".to_string(),
        request_nonce: None,
        nvidia_payload: None,
        raw: None,
    };
    let result = harness.verifier.verify(&report).await;

    assert_eq!(result.provider, "redpill");
    assert!(!result.model_verified);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("Could not find model info"));
}

#[tokio::test]
async fn tinfoil_reports_route_to_the_policy_verifier() {
    let harness = start_harness().await;
    let report = AttestationReport {
        provider: Provider::Tinfoil,
        model_id: Some("doc-upload".to_string()),
        // Not hex: the quote is rejected before any oracle is consulted.
        intel_quote: "zz".to_string(),
        request_nonce: None,
        nvidia_payload: None,
        raw: None,
    };
    let result = harness.verifier.verify(&report).await;

    assert_eq!(result.provider, "tinfoil");
    assert!(!result.model_verified);
    assert!(result.error.as_deref().unwrap().contains("Invalid quote hex"));
}

#[tokio::test]
async fn unknown_providers_get_plain_intel_verification() {
    let harness = start_harness().await;
    let report: AttestationReport = serde_json::from_value(json!({
        "provider": "some-new-cloud",
        "intel_quote": "0400",
    }))
    .unwrap();
    let result = harness.verifier.verify(&report).await;

    assert_eq!(result.provider, "generic");
    assert!(!result.model_verified);
    // DCAP cannot verify a 2-byte quote; the baseline error shape remains.
    assert_eq!(result.claims["status"], "Error");
}

#[tokio::test]
async fn gpu_evidence_is_merged_for_non_gpu_paths() {
    let harness = start_harness().await;
    let report: AttestationReport = serde_json::from_value(json!({
        "provider": "generic",
        "intel_quote": "0400",
        "nvidia_payload": {"nonce": REQUEST_NONCE, "evidence_list": []},
    }))
    .unwrap();
    let result = harness.verifier.verify(&report).await;

    // TDX failed, but the GPU verdict still lands in claims and hardware.
    assert!(!result.model_verified);
    assert!(serde_json::to_value(&result.hardware_type)
        .unwrap()
        .as_array()
        .unwrap()
        .contains(&Value::String("NVIDIA_CC".to_string())));
    assert_eq!(result.claims["nvidia"]["x-nvidia-overall-att-result"], true);
}

#[tokio::test]
async fn verification_is_idempotent_modulo_timestamp() {
    let harness = start_harness().await;
    let report = nearai_report();

    let first = harness.verifier.verify(&report).await;
    let second = harness.verifier.verify(&report).await;

    assert_eq!(first.model_verified, second.model_verified);
    assert_eq!(
        Value::Object(first.claims.clone()),
        Value::Object(second.claims.clone())
    );
    assert_eq!(first.error, second.error);
}
