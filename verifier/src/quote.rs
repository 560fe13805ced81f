//! TDX v4 quote parsing.
//!
//! Decodes the fixed-layout TD report body out of a raw quote without
//! touching the signature chain (that is the DCAP oracle's job). Used both
//! for claims extraction and as the best-effort fallback when DCAP
//! verification fails but policy layers still need the measurement
//! registers.

use serde_json::{Map, Value};

use crate::error::Error;

// TDX Quote v4 = Header (48 bytes) + TD10 Report Body (584 bytes) + Auth Data.
// Field offsets below are relative to the body start and are load-bearing:
// any deviation breaks parsing.
pub const HEADER_SIZE: usize = 48;
pub const BODY_SIZE: usize = 584;
pub const MIN_QUOTE_SIZE: usize = HEADER_SIZE + BODY_SIZE;

const TEE_TCB_SVN: (usize, usize) = (0, 16);
const MR_SEAM: (usize, usize) = (16, 64);
const MR_SIGNER_SEAM: (usize, usize) = (64, 112);
const SEAM_ATTRIBUTES: (usize, usize) = (112, 120);
const TD_ATTRIBUTES: (usize, usize) = (120, 128);
const XFAM: (usize, usize) = (128, 136);
const MR_TD: (usize, usize) = (136, 184);
const MR_CONFIG_ID: (usize, usize) = (184, 232);
const MR_OWNER: (usize, usize) = (232, 280);
const MR_OWNER_CONFIG: (usize, usize) = (280, 328);
const RT_MR0: (usize, usize) = (328, 376);
const RT_MR1: (usize, usize) = (376, 424);
const RT_MR2: (usize, usize) = (424, 472);
const RT_MR3: (usize, usize) = (472, 520);
const REPORT_DATA: (usize, usize) = (520, 584);

/// Decoded TD report body. All fields are lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TdxQuoteBody {
    pub tee_tcb_svn: String,
    pub mr_seam: String,
    pub mr_signer_seam: String,
    pub seam_attributes: String,
    pub td_attributes: String,
    pub xfam: String,
    pub mr_td: String,
    pub mr_config_id: String,
    pub mr_owner: String,
    pub mr_owner_config: String,
    pub rt_mr0: String,
    pub rt_mr1: String,
    pub rt_mr2: String,
    pub rt_mr3: String,
    pub report_data: String,
}

impl TdxQuoteBody {
    /// The measurement registers in claim order: MRTD then RTMR0-3.
    pub fn registers(&self) -> [&str; 5] {
        [
            &self.mr_td,
            &self.rt_mr0,
            &self.rt_mr1,
            &self.rt_mr2,
            &self.rt_mr3,
        ]
    }

    /// Insert every body field into a claims map, plus the `registers`
    /// array the policy layers iterate over.
    pub fn insert_claims(&self, claims: &mut Map<String, Value>) {
        claims.insert("tee_tcb_svn".into(), self.tee_tcb_svn.clone().into());
        claims.insert("mr_seam".into(), self.mr_seam.clone().into());
        claims.insert("mr_signer_seam".into(), self.mr_signer_seam.clone().into());
        claims.insert(
            "seam_attributes".into(),
            self.seam_attributes.clone().into(),
        );
        claims.insert("td_attributes".into(), self.td_attributes.clone().into());
        claims.insert("xfam".into(), self.xfam.clone().into());
        claims.insert("mr_td".into(), self.mr_td.clone().into());
        claims.insert("mr_config_id".into(), self.mr_config_id.clone().into());
        claims.insert("mr_owner".into(), self.mr_owner.clone().into());
        claims.insert(
            "mr_owner_config".into(),
            self.mr_owner_config.clone().into(),
        );
        claims.insert("rt_mr0".into(), self.rt_mr0.clone().into());
        claims.insert("rt_mr1".into(), self.rt_mr1.clone().into());
        claims.insert("rt_mr2".into(), self.rt_mr2.clone().into());
        claims.insert("rt_mr3".into(), self.rt_mr3.clone().into());
        claims.insert("report_data".into(), self.report_data.clone().into());
        claims.insert(
            "registers".into(),
            Value::Array(
                self.registers()
                    .iter()
                    .map(|r| Value::String(r.to_string()))
                    .collect(),
            ),
        );
    }
}

/// Parse the TD report body out of raw quote bytes.
///
/// Pure and deterministic. Fails with [`Error::QuoteMalformed`] when the
/// quote cannot contain a full body (header + 584 bytes).
pub fn parse_quote(quote: &[u8]) -> Result<TdxQuoteBody, Error> {
    if quote.len() < MIN_QUOTE_SIZE {
        return Err(Error::QuoteMalformed(quote.len()));
    }

    let body = &quote[HEADER_SIZE..HEADER_SIZE + BODY_SIZE];
    let field = |range: (usize, usize)| hex::encode(&body[range.0..range.1]);

    Ok(TdxQuoteBody {
        tee_tcb_svn: field(TEE_TCB_SVN),
        mr_seam: field(MR_SEAM),
        mr_signer_seam: field(MR_SIGNER_SEAM),
        seam_attributes: field(SEAM_ATTRIBUTES),
        td_attributes: field(TD_ATTRIBUTES),
        xfam: field(XFAM),
        mr_td: field(MR_TD),
        mr_config_id: field(MR_CONFIG_ID),
        mr_owner: field(MR_OWNER),
        mr_owner_config: field(MR_OWNER_CONFIG),
        rt_mr0: field(RT_MR0),
        rt_mr1: field(RT_MR1),
        rt_mr2: field(RT_MR2),
        rt_mr3: field(RT_MR3),
        report_data: field(REPORT_DATA),
    })
}

/// Parse a hex-encoded quote. See [`parse_quote`].
pub fn parse_quote_hex(quote_hex: &str) -> Result<TdxQuoteBody, Error> {
    let bytes = hex::decode(quote_hex.trim())?;
    parse_quote(&bytes)
}

/// Extract just the 64-byte report_data field as hex. Used for
/// nonce/address binding checks against a provider-returned quote.
pub fn extract_report_data_hex(quote_hex: &str) -> Option<String> {
    parse_quote_hex(quote_hex).ok().map(|body| body.report_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A quote body where every field is filled with a distinct byte so the
    /// offsets can be checked exactly.
    fn patterned_quote() -> Vec<u8> {
        let mut quote = vec![0u8; MIN_QUOTE_SIZE];
        let ranges: [((usize, usize), u8); 15] = [
            (TEE_TCB_SVN, 0x01),
            (MR_SEAM, 0x02),
            (MR_SIGNER_SEAM, 0x03),
            (SEAM_ATTRIBUTES, 0x04),
            (TD_ATTRIBUTES, 0x05),
            (XFAM, 0x06),
            (MR_TD, 0x07),
            (MR_CONFIG_ID, 0x08),
            (MR_OWNER, 0x09),
            (MR_OWNER_CONFIG, 0x0a),
            (RT_MR0, 0x0b),
            (RT_MR1, 0x0c),
            (RT_MR2, 0x0d),
            (RT_MR3, 0x0e),
            (REPORT_DATA, 0x0f),
        ];
        for ((start, end), byte) in ranges {
            for b in &mut quote[HEADER_SIZE + start..HEADER_SIZE + end] {
                *b = byte;
            }
        }
        quote
    }

    #[test]
    fn test_field_widths() {
        let body = parse_quote(&patterned_quote()).unwrap();
        // Hex strings are twice the byte width.
        assert_eq!(body.tee_tcb_svn.len(), 32);
        assert_eq!(body.mr_seam.len(), 96);
        assert_eq!(body.mr_signer_seam.len(), 96);
        assert_eq!(body.seam_attributes.len(), 16);
        assert_eq!(body.td_attributes.len(), 16);
        assert_eq!(body.xfam.len(), 16);
        for mr in [
            &body.mr_td,
            &body.mr_config_id,
            &body.mr_owner,
            &body.mr_owner_config,
            &body.rt_mr0,
            &body.rt_mr1,
            &body.rt_mr2,
            &body.rt_mr3,
        ] {
            assert_eq!(mr.len(), 96);
        }
        assert_eq!(body.report_data.len(), 128);
    }

    #[test]
    fn test_fields_land_on_their_offsets() {
        let body = parse_quote(&patterned_quote()).unwrap();
        assert_eq!(body.tee_tcb_svn, "01".repeat(16));
        assert_eq!(body.mr_seam, "02".repeat(48));
        assert_eq!(body.td_attributes, "05".repeat(8));
        assert_eq!(body.xfam, "06".repeat(8));
        assert_eq!(body.mr_td, "07".repeat(48));
        assert_eq!(body.rt_mr0, "0b".repeat(48));
        assert_eq!(body.rt_mr3, "0e".repeat(48));
        assert_eq!(body.report_data, "0f".repeat(64));
    }

    #[test]
    fn test_registers_order() {
        let body = parse_quote(&patterned_quote()).unwrap();
        let registers = body.registers();
        assert_eq!(registers.len(), 5);
        assert_eq!(registers[0], body.mr_td);
        assert_eq!(registers[1], body.rt_mr0);
        assert_eq!(registers[4], body.rt_mr3);
    }

    #[test]
    fn test_short_quote_fails() {
        for len in [0, 1, HEADER_SIZE, MIN_QUOTE_SIZE - 1] {
            let err = parse_quote(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, Error::QuoteMalformed(l) if l == len));
        }
    }

    #[test]
    fn test_exact_and_oversized_quotes_parse() {
        assert!(parse_quote(&vec![0u8; MIN_QUOTE_SIZE]).is_ok());
        // Real quotes carry auth data after the body.
        assert!(parse_quote(&vec![0u8; MIN_QUOTE_SIZE + 4000]).is_ok());
    }

    #[test]
    fn test_hex_output_is_lowercase() {
        let mut quote = vec![0xABu8; MIN_QUOTE_SIZE];
        quote[HEADER_SIZE] = 0xCD;
        let body = parse_quote(&quote).unwrap();
        assert!(body.tee_tcb_svn.starts_with("cd"));
        assert!(body.mr_seam.chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_extract_report_data_hex() {
        let quote = patterned_quote();
        let hex_quote = hex::encode(&quote);
        assert_eq!(
            extract_report_data_hex(&hex_quote).unwrap(),
            "0f".repeat(64)
        );
        assert!(extract_report_data_hex("deadbeef").is_none());
        assert!(extract_report_data_hex("not-hex").is_none());
    }
}
