//! Wire types shared by the verification engine and the REST server.
//!
//! Provider APIs return loosely-shaped JSON (optional fields, nested
//! payloads, sometimes stringified sub-documents). Everything is normalised
//! into these types at the ingest boundary so the verifiers can dispatch on
//! closed enums instead of string comparisons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attestation service provider, as tagged on incoming reports.
///
/// Reports from unknown sources fall back to `Generic` and get plain Intel
/// TDX verification without any provider policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Tinfoil,
    Redpill,
    Nearai,
    #[serde(other)]
    Generic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Tinfoil => "tinfoil",
            Provider::Redpill => "redpill",
            Provider::Nearai => "nearai",
            Provider::Generic => "generic",
        }
    }

    /// Parse a provider name (case-insensitive). Unknown names map to `Generic`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "tinfoil" => Provider::Tinfoil,
            "redpill" => Provider::Redpill,
            "nearai" => Provider::Nearai,
            _ => Provider::Generic,
        }
    }
}

/// Attested hardware class contributing to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareType {
    #[serde(rename = "INTEL_TDX")]
    IntelTdx,
    #[serde(rename = "NVIDIA_CC")]
    NvidiaCc,
}

/// Provider-tagged envelope the engine consumes. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationReport {
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Hex string of the raw TDX quote bytes.
    pub intel_quote: String,
    /// 32-byte hex nonce the caller embedded in the attestation request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_nonce: Option<String>,
    /// Opaque GPU evidence for NRAS. Providers sometimes return this as a
    /// stringified JSON document; it is parsed at ingest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvidia_payload: Option<Value>,
    /// Provider-specific passthrough (`signing_address`, `repo`,
    /// `gateway_attestation`, `model_attestations`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Final verdict surface returned by every verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub model_verified: bool,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub hardware_type: Vec<HardwareType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_address: Option<String>,
    pub claims: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl VerificationResult {
    /// A fresh result shell for the given sub-verifier provenance.
    pub fn new(provider: &str) -> Self {
        Self {
            model_verified: false,
            provider: provider.to_string(),
            timestamp: Utc::now(),
            hardware_type: Vec::new(),
            model_id: None,
            request_nonce: None,
            signing_address: None,
            claims: Map::new(),
            error: None,
            raw: None,
        }
    }

    /// Terminal failure with an explanatory error.
    pub fn failed(provider: &str, error: impl Into<String>) -> Self {
        let mut result = Self::new(provider);
        result.error = Some(error.into());
        result
    }

    /// Append to the `;`-joined error string without discarding earlier
    /// failures.
    pub fn push_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.error = Some(match self.error.take() {
            Some(existing) => format!("{}; {}", existing, error),
            None => error,
        });
    }

    /// Add a hardware type if it is not already recorded.
    pub fn add_hardware(&mut self, hw: HardwareType) {
        if !self.hardware_type.contains(&hw) {
            self.hardware_type.push(hw);
        }
    }
}

/// Uniform quote bundle every verifier consumes. The facade builds this
/// from an [`AttestationReport`] so downstream code has one access path for
/// the quote and its binding metadata.
#[derive(Debug, Clone, Default)]
pub struct QuoteInput {
    pub quote_hex: String,
    pub model_id: Option<String>,
    pub repo: Option<String>,
    pub request_nonce: Option<String>,
    pub signing_address: Option<String>,
}

impl QuoteInput {
    pub fn from_hex(quote_hex: impl Into<String>) -> Self {
        Self {
            quote_hex: quote_hex.into(),
            ..Default::default()
        }
    }
}

/// Verdict for one sub-component of a composite verification (Phala
/// model/KMS/gateway, NearAI gateway/model).
#[derive(Debug, Clone, Serialize)]
pub struct ComponentVerdict {
    pub name: String,
    pub is_valid: bool,
    pub compose_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub details: Map<String, Value>,
}

/// Return `value` as a JSON document if it is a stringified one, otherwise
/// as-is. Providers are inconsistent about nesting vs. escaping.
pub fn parse_if_string(value: &Value) -> Value {
    if let Value::String(s) = value {
        if let Ok(parsed) = serde_json::from_str::<Value>(s) {
            return parsed;
        }
    }
    value.clone()
}

/// Render `value` as the string the dstack-verifier expects: strings pass
/// through untouched, everything else is JSON-encoded.
pub fn to_wire_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_roundtrip() {
        for (name, provider) in [
            ("tinfoil", Provider::Tinfoil),
            ("redpill", Provider::Redpill),
            ("nearai", Provider::Nearai),
        ] {
            assert_eq!(Provider::parse(name), provider);
            assert_eq!(provider.as_str(), name);
        }
        assert_eq!(Provider::parse("something-else"), Provider::Generic);
    }

    #[test]
    fn test_unknown_provider_deserializes_as_generic() {
        let report: AttestationReport = serde_json::from_value(serde_json::json!({
            "provider": "acme-cloud",
            "intel_quote": "0400",
        }))
        .unwrap();
        assert_eq!(report.provider, Provider::Generic);
    }

    #[test]
    fn test_hardware_type_wire_names() {
        assert_eq!(
            serde_json::to_value([HardwareType::IntelTdx, HardwareType::NvidiaCc]).unwrap(),
            serde_json::json!(["INTEL_TDX", "NVIDIA_CC"])
        );
    }

    #[test]
    fn test_push_error_joins_with_semicolon() {
        let mut result = VerificationResult::new("intel");
        result.push_error("first");
        result.push_error("second");
        assert_eq!(result.error.as_deref(), Some("first; second"));
    }

    #[test]
    fn test_parse_if_string_unwraps_nested_json() {
        let nested = Value::String("{\"nonce\":\"abc\"}".to_string());
        assert_eq!(parse_if_string(&nested)["nonce"], "abc");

        let plain = serde_json::json!({"nonce": "abc"});
        assert_eq!(parse_if_string(&plain), plain);
    }

    #[test]
    fn test_to_wire_string() {
        assert_eq!(to_wire_string(&Value::String("raw".into())), "raw");
        assert_eq!(
            to_wire_string(&serde_json::json!({"a": 1})),
            "{\"a\":1}".to_string()
        );
    }
}
