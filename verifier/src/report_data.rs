//! Report-data binding.
//!
//! The TDX `report_data` field is 64 caller-controlled bytes. Attested
//! inference services embed the response-signing address and the caller's
//! request nonce as `address (20 bytes) || zero padding (12 bytes) ||
//! nonce (32 bytes)`, which ties the quote to both the signer identity and
//! the specific request.

use serde::Serialize;

/// Outcome of comparing a quote's report_data against the expected
/// signer address and request nonce.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDataCheck {
    pub valid: bool,
    pub address_match: bool,
    pub nonce_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportDataCheck {
    fn failed(error: String) -> Self {
        Self {
            valid: false,
            address_match: false,
            nonce_match: false,
            error: Some(error),
        }
    }
}

/// Verify that `report_data` binds the signing address and request nonce.
///
/// Layout: `report_data[0..32]` = signing address right-padded with zeros,
/// `report_data[32..64]` = nonce. The address may carry a `0x` prefix.
pub fn verify_report_data(
    report_data_hex: &str,
    signing_address: &str,
    request_nonce: &str,
) -> ReportDataCheck {
    let report_data = match hex::decode(report_data_hex.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return ReportDataCheck::failed(format!("Invalid report_data hex: {}", e)),
    };
    if report_data.len() != 64 {
        return ReportDataCheck::failed(format!(
            "Invalid report_data length: {}",
            report_data.len()
        ));
    }

    let address_hex = signing_address
        .strip_prefix("0x")
        .unwrap_or(signing_address);
    let address_bytes = match hex::decode(address_hex) {
        Ok(bytes) => bytes,
        Err(e) => return ReportDataCheck::failed(format!("Invalid signing_address hex: {}", e)),
    };
    if address_bytes.len() > 32 {
        return ReportDataCheck::failed(format!(
            "Invalid signing_address length: {}",
            address_bytes.len()
        ));
    }

    let nonce_bytes = match hex::decode(request_nonce.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return ReportDataCheck::failed(format!("Invalid nonce hex: {}", e)),
    };

    // Right-pad the address to fill the first 32 bytes.
    let mut expected_address = [0u8; 32];
    expected_address[..address_bytes.len()].copy_from_slice(&address_bytes);

    let address_match = report_data[..32] == expected_address;
    let nonce_match = report_data[32..] == nonce_bytes[..];

    ReportDataCheck {
        valid: address_match && nonce_match,
        address_match,
        nonce_match,
        error: None,
    }
}
