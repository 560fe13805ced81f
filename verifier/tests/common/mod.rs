//! Shared fixtures for the integration suites: crafted TDX v4 quotes,
//! report-data construction, and NRAS-style JWTs.
#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

pub const HEADER_SIZE: usize = 48;
pub const QUOTE_SIZE: usize = 632;

pub const SIGNING_ADDRESS: &str = "0x1234567890abcdef1234567890abcdef12345678";
pub const REQUEST_NONCE: &str =
    "a1a2a3a4a5a6a7a8a9aaabacadaeafb0b1b2b3b4b5b6b7b8b9babbbcbdbebfc0";

/// Fields a crafted quote body should carry. Everything defaults to zero.
#[derive(Default, Clone)]
pub struct QuoteSpec {
    pub mr_seam: Option<Vec<u8>>,
    pub td_attributes: Option<Vec<u8>>,
    pub xfam: Option<Vec<u8>>,
    pub mr_td: Option<Vec<u8>>,
    pub rt_mr0: Option<Vec<u8>>,
    pub rt_mr1: Option<Vec<u8>>,
    pub rt_mr2: Option<Vec<u8>>,
    pub report_data: Option<Vec<u8>>,
}

/// Build a minimal 632-byte quote whose body carries the given fields at
/// the TDX v4 offsets. The header stays zeroed: such a quote never passes
/// DCAP, which is exactly what the policy-layer tests need.
pub fn build_quote(spec: &QuoteSpec) -> Vec<u8> {
    let mut quote = vec![0u8; QUOTE_SIZE];
    let mut put = |offset: usize, bytes: &Option<Vec<u8>>| {
        if let Some(bytes) = bytes {
            quote[HEADER_SIZE + offset..HEADER_SIZE + offset + bytes.len()]
                .copy_from_slice(bytes);
        }
    };
    put(16, &spec.mr_seam);
    put(120, &spec.td_attributes);
    put(128, &spec.xfam);
    put(136, &spec.mr_td);
    put(328, &spec.rt_mr0);
    put(376, &spec.rt_mr1);
    put(424, &spec.rt_mr2);
    put(520, &spec.report_data);
    quote
}

/// report_data bytes binding `SIGNING_ADDRESS` and `REQUEST_NONCE`.
pub fn bound_report_data() -> Vec<u8> {
    report_data_for(SIGNING_ADDRESS, REQUEST_NONCE)
}

pub fn report_data_for(address: &str, nonce: &str) -> Vec<u8> {
    let mut rd = vec![0u8; 64];
    let address_bytes = hex::decode(address.trim_start_matches("0x")).unwrap();
    rd[..address_bytes.len()].copy_from_slice(&address_bytes);
    let nonce_bytes = hex::decode(nonce).unwrap();
    rd[32..].copy_from_slice(&nonce_bytes);
    rd
}

/// An unsigned JWT carrying the given claims (NRAS / ITA token shape).
pub fn make_jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"ES384\",\"typ\":\"JWT\"}");
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
    format!("{}.{}.unsigned", header, payload)
}

/// NRAS response body: platform token + one device token.
pub fn nras_response(overall: bool) -> Value {
    serde_json::json!([
        [
            "JWT",
            make_jwt(serde_json::json!({
                "x-nvidia-overall-att-result": overall,
                "iss": "https://nras.attestation.nvidia.com",
            }))
        ],
        {
            "GPU-0": make_jwt(serde_json::json!({
                "measres": if overall { "success" } else { "fail" },
                "x-nvidia-gpu-arch-check": overall,
            }))
        }
    ])
}
