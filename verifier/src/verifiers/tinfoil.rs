//! Tinfoil policy verification.
//!
//! Stacks two policies on top of the baseline Intel verdict:
//! a hardware pin (known-good TDX module, fixed TD attributes and XFAM,
//! zeroed owner fields) and a manifest pin (Sigstore-published golden
//! RTMR1/RTMR2 for the model image plus a matching MRTD/RTMR0 hardware
//! profile). Policy reasons are additive: a failed baseline still gets the
//! full policy diagnosis.
//!
//! Pinned values derive from tinfoilsh/verifier's TDX attestation policy.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::config::Settings;
use crate::sigstore::{HardwareProfile, SigstoreClient};
use crate::types::{QuoteInput, VerificationResult};
use crate::verifiers::intel::IntelTdxVerifier;

/// Accepted MR_SEAM values (TDX module hashes) for Tinfoil's environment.
pub const ACCEPTED_MR_SEAMS: &[&str] = &[
    "49b66faa451d19ebbdbe89371b8daf2b65aa3984ec90110343e9e2eec116af08850fa20e3b1aa9a874d77a65380ee7e6",
    // Newer TDX module version
    "685f891ea5c20e8fa27b151bf34bf3b50fbaf7143cc53662727cbdb167c0ad8385f1f6f3571539a91e104a1c96d75e04",
];

/// Expected TD attributes: debug disabled, fixed feature bits.
pub const EXPECTED_TD_ATTRIBUTES: &str = "0000001000000000";

/// Expected XFAM, matching Tinfoil's QEMU configuration for TDX guests.
pub const EXPECTED_XFAM: &str = "e702060000000000";

const ZERO_48: &str =
    "000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Default)]
pub struct TinfoilVerifier {
    intel: IntelTdxVerifier,
    sigstore: SigstoreClient,
}

impl TinfoilVerifier {
    pub fn new(settings: &Settings) -> Self {
        Self {
            intel: IntelTdxVerifier::new(settings),
            sigstore: SigstoreClient::default(),
        }
    }

    /// Override the Sigstore endpoints (tests).
    pub fn with_sigstore(mut self, sigstore: SigstoreClient) -> Self {
        self.sigstore = sigstore;
        self
    }

    pub async fn verify(&self, input: &QuoteInput) -> VerificationResult {
        let mut result = self.intel.verify(input).await;
        if result.claims.is_empty() {
            return result;
        }

        let mut reasons = Vec::new();
        check_hardware_policy(&result.claims, &mut reasons);

        let repo = result
            .claims
            .get("repo")
            .and_then(Value::as_str)
            .map(String::from);
        if let Some(repo) = repo {
            self.check_manifest_policy(&mut result.claims, &repo, &mut reasons)
                .await;
        }

        if !reasons.is_empty() {
            result.model_verified = false;
            result.push_error(format!("Policy violation: {}", reasons.join(", ")));
        }

        // Internal working field; not part of the cleaned claim surface.
        result.claims.remove("registers");
        result
    }

    async fn check_manifest_policy(
        &self,
        claims: &mut Map<String, Value>,
        repo: &str,
        reasons: &mut Vec<String>,
    ) {
        // Golden image measurements (RTMR1/RTMR2) for this repo.
        let golden = self.sigstore.golden_image(repo).await;

        let actual_rtmr1 = claims.get("rt_mr1").and_then(Value::as_str);
        let actual_rtmr2 = claims.get("rt_mr2").and_then(Value::as_str);

        if golden.rtmr1.as_deref() != actual_rtmr1 {
            reasons.push(format!(
                "RTMR1 mismatch: expected {}, got {}",
                golden.rtmr1.as_deref().unwrap_or("<none>"),
                actual_rtmr1.unwrap_or("<none>")
            ));
        }
        if golden.rtmr2.as_deref() != actual_rtmr2 {
            reasons.push(format!(
                "RTMR2 mismatch: expected {}, got {}",
                golden.rtmr2.as_deref().unwrap_or("<none>"),
                actual_rtmr2.unwrap_or("<none>")
            ));
        }

        // Hardware profile match (MRTD/RTMR0) against the shared
        // hardware-measurements repo.
        let profiles = self.sigstore.hardware_profiles().await;
        let actual_mrtd = claims.get("mr_td").and_then(Value::as_str);
        let actual_rtmr0 = claims.get("rt_mr0").and_then(Value::as_str);

        match (actual_mrtd, actual_rtmr0) {
            (Some(mrtd), Some(rtmr0)) => {
                if let Some(profile) = find_hardware_profile(&profiles, mrtd, rtmr0) {
                    claims.insert("hw_profile".into(), profile.into());
                } else {
                    reasons.push(format!(
                        "No matching hardware profile found for MRTD={}... RTMR0={}...",
                        &mrtd[..8.min(mrtd.len())],
                        &rtmr0[..8.min(rtmr0.len())]
                    ));
                }
            }
            _ => reasons.push("No matching hardware profile found: measurements missing".into()),
        }
    }
}

/// Hardware pin: collect a reason for every field that deviates from
/// Tinfoil's pinned environment. Missing claims compare as empty strings.
pub(crate) fn check_hardware_policy(claims: &Map<String, Value>, reasons: &mut Vec<String>) {
    let get = |key: &str| claims.get(key).and_then(Value::as_str).unwrap_or("");

    let mr_seam = get("mr_seam");
    if !ACCEPTED_MR_SEAMS.contains(&mr_seam) {
        reasons.push(format!("Invalid MrSeam: {}", mr_seam));
    }

    if get("td_attributes") != EXPECTED_TD_ATTRIBUTES {
        reasons.push(format!("Invalid TdAttributes: {}", get("td_attributes")));
    }

    if get("xfam") != EXPECTED_XFAM {
        reasons.push(format!("Invalid Xfam: {}", get("xfam")));
    }

    if get("mr_owner") != ZERO_48 {
        reasons.push("mr_owner is not zero".to_string());
    }

    if get("mr_owner_config") != ZERO_48 {
        reasons.push("mr_owner_config is not zero".to_string());
    }

    // RTMR3 must stay unextended.
    let rtmr3 = get("rt_mr3");
    if !rtmr3.is_empty() && rtmr3 != ZERO_48 {
        reasons.push("RTMR3 is not zeroed".to_string());
    }
}

fn find_hardware_profile(
    profiles: &HashMap<String, HardwareProfile>,
    mrtd: &str,
    rtmr0: &str,
) -> Option<String> {
    profiles
        .iter()
        .find(|(_, p)| p.mrtd.as_deref() == Some(mrtd) && p.rtmr0.as_deref() == Some(rtmr0))
        .map(|(name, _)| name.clone())
}
