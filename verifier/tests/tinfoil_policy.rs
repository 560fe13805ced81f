//! Tinfoil hardware + manifest policy over a stubbed Sigstore proxy.
//!
//! The crafted quotes carry compliant measurement registers but an
//! unsigned header, so the DCAP baseline fails while the policy layers
//! still run on the manually parsed registers. Policy reasons must be
//! additive to the baseline error.

mod common;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use confidential_verifier::config::Settings;
use confidential_verifier::sigstore::SigstoreClient;
use confidential_verifier::types::QuoteInput;
use confidential_verifier::verifiers::tinfoil::{
    TinfoilVerifier, ACCEPTED_MR_SEAMS, EXPECTED_TD_ATTRIBUTES, EXPECTED_XFAM,
};

use common::{build_quote, QuoteSpec};

const REPO: &str = "tinfoilsh/confidential-test-model";

/// A distinct 48-byte measurement: `fill` everywhere, `last` at the end.
fn measurement(fill: u8, last: u8) -> Vec<u8> {
    let mut bytes = vec![fill; 48];
    bytes[47] = last;
    bytes
}

fn golden_mr_td() -> String {
    hex::encode(measurement(0x07, 0xa0))
}
fn golden_rtmr0() -> String {
    hex::encode(measurement(0x0b, 0xa1))
}
fn golden_rtmr1() -> String {
    hex::encode(measurement(0x0c, 0xa2))
}
fn golden_rtmr2() -> String {
    hex::encode(measurement(0x0d, 0xa3))
}

/// Quote whose body matches the Tinfoil hardware pin and the stubbed
/// golden measurements.
fn compliant_quote() -> QuoteSpec {
    QuoteSpec {
        mr_seam: Some(hex::decode(ACCEPTED_MR_SEAMS[0]).unwrap()),
        td_attributes: Some(hex::decode(EXPECTED_TD_ATTRIBUTES).unwrap()),
        xfam: Some(hex::decode(EXPECTED_XFAM).unwrap()),
        mr_td: Some(measurement(0x07, 0xa0)),
        rt_mr0: Some(measurement(0x0b, 0xa1)),
        rt_mr1: Some(measurement(0x0c, 0xa2)),
        rt_mr2: Some(measurement(0x0d, 0xa3)),
        ..Default::default()
    }
}

fn dsse_bundle(statement: Value) -> Value {
    json!({
        "attestations": [{
            "bundle": {
                "dsseEnvelope": {
                    "payload": STANDARD.encode(serde_json::to_vec(&statement).unwrap()),
                }
            }
        }]
    })
}

/// Stub the three-step Sigstore fetch for both the image repo and the
/// hardware-measurements repo.
async fn start_sigstore_stub() -> MockServer {
    let server = MockServer::start().await;

    for repo in [REPO, "tinfoilsh/hardware-measurements"] {
        let digest = format!("{:064x}", if repo == REPO { 1 } else { 2 });
        Mock::given(method("GET"))
            .and(path(format!("/repos/{}/releases/latest", repo)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tag_name": "v1.0.0"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{}/releases/download/v1.0.0/tinfoil.hash", repo)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}\n", digest)))
            .mount(&server)
            .await;
    }

    let image_statement = json!({
        "predicateType": "https://tinfoil.sh/predicate/snp-tdx-multiplatform/v1",
        "predicate": {
            "tdx_measurement": {"rtmr1": golden_rtmr1(), "rtmr2": golden_rtmr2()},
        },
    });
    Mock::given(method("GET"))
        .and(path(format!(
            "/repos/{}/attestations/sha256:{:064x}",
            REPO, 1
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(dsse_bundle(image_statement)))
        .mount(&server)
        .await;

    let hw_statement = json!({
        "predicateType": "https://tinfoil.sh/predicate/hardware-measurements/v1",
        "predicate": {
            "default": {"mrtd": golden_mr_td(), "rtmr0": golden_rtmr0()},
            "h200-8x": {"mrtd": "ee".repeat(48), "rtmr0": "ee".repeat(48)},
        },
    });
    Mock::given(method("GET"))
        .and(path(format!(
            "/repos/tinfoilsh/hardware-measurements/attestations/sha256:{:064x}",
            2
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(dsse_bundle(hw_statement)))
        .mount(&server)
        .await;

    server
}

fn verifier(server: &MockServer) -> TinfoilVerifier {
    TinfoilVerifier::new(&Settings::default())
        .with_sigstore(SigstoreClient::new(server.uri(), server.uri()))
}

fn input_for(spec: &QuoteSpec) -> QuoteInput {
    QuoteInput {
        quote_hex: hex::encode(build_quote(spec)),
        repo: Some(REPO.to_string()),
        model_id: Some("test-model".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn compliant_quote_passes_policy_and_claims_profile() {
    let server = start_sigstore_stub().await;
    let result = verifier(&server).verify(&input_for(&compliant_quote())).await;

    // Unsigned quote: the DCAP baseline fails and is preserved...
    assert!(!result.model_verified);
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("Verification failed"), "error: {}", error);
    // ...but the policy layers found nothing to complain about.
    assert!(!error.contains("Policy violation"), "error: {}", error);

    assert_eq!(result.claims["hw_profile"], "default");
    assert_eq!(result.claims["status"], "Error");
    assert_eq!(result.claims["repo"], REPO);
    // Cleaned claim surface: the internal registers array is stripped.
    assert!(result.claims.get("registers").is_none());
}

#[tokio::test]
async fn flipped_rtmr1_byte_adds_mismatch_reason() {
    let server = start_sigstore_stub().await;
    let mut spec = compliant_quote();
    spec.rt_mr1.as_mut().unwrap()[0] ^= 0x01;

    let result = verifier(&server).verify(&input_for(&spec)).await;
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("Policy violation"), "error: {}", error);
    assert!(error.contains("RTMR1 mismatch"), "error: {}", error);
    assert!(!error.contains("RTMR2 mismatch"), "error: {}", error);
}

#[tokio::test]
async fn unknown_hardware_gets_no_profile() {
    let server = start_sigstore_stub().await;
    let mut spec = compliant_quote();
    spec.rt_mr0.as_mut().unwrap()[47] ^= 0xff;

    let result = verifier(&server).verify(&input_for(&spec)).await;
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("No matching hardware profile found"));
    assert!(result.claims.get("hw_profile").is_none());
}

#[tokio::test]
async fn rejected_mr_seam_is_a_policy_violation() {
    let server = start_sigstore_stub().await;
    let mut spec = compliant_quote();
    spec.mr_seam = Some(vec![0x99; 48]);

    let result = verifier(&server).verify(&input_for(&spec)).await;
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("Policy violation"));
    assert!(error.contains("Invalid MrSeam"));
}

#[tokio::test]
async fn dead_sigstore_fails_the_manifest_pin() {
    // No stub: every fetch fails, golden values stay empty, and the
    // manifest pin must fail closed.
    let verifier = TinfoilVerifier::new(&Settings::default())
        .with_sigstore(SigstoreClient::new("http://127.0.0.1:1", "http://127.0.0.1:1"));

    let result = verifier.verify(&input_for(&compliant_quote())).await;
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("Policy violation"), "error: {}", error);
    assert!(error.contains("RTMR1 mismatch"));
    assert!(error.contains("No matching hardware profile found"));
}

#[tokio::test]
async fn policy_without_repo_skips_manifest_pin() {
    let server = start_sigstore_stub().await;
    let mut input = input_for(&compliant_quote());
    input.repo = None;

    let result = verifier(&server).verify(&input).await;
    let error = result.error.as_deref().unwrap();
    // Hardware pin passes; no manifest pin without a repo.
    assert!(!error.contains("Policy violation"), "error: {}", error);
    assert!(result.claims.get("hw_profile").is_none());
}
