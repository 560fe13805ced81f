//! DCAP oracle.
//!
//! Wraps dcap-qvl's collateral fetch + quote verification and normalises
//! its output: the TCB status string is classified into the accepted set
//! (Intel's "attestation valid, patch advisories only" states), and the
//! TD10/TD15 report body is converted to the engine's hex representation.
//!
//! Collateral is fetched from Intel PCS inside the library, so this call
//! can take network time and fail for reasons unrelated to the quote
//! itself; callers treat any failure as a DCAP failure and fall back to
//! best-effort manual parsing for diagnostics.

use dcap_qvl::collateral::get_collateral_and_verify;
use dcap_qvl::quote::TDReport10;

use crate::error::Error;
use crate::quote::TdxQuoteBody;

/// TCB statuses that count as a successful attestation.
pub const ACCEPTED_TCB_STATUSES: &[&str] = &[
    "UpToDate",
    "SWHardeningNeeded",
    "ConfigurationNeeded",
    "ConfigurationAndSWHardeningNeeded",
];

/// Whether a DCAP TCB status string falls in the accepted set.
/// `OutOfDate`, `OutOfDateConfigurationNeeded`, `Revoked` and anything
/// unrecognised fail.
pub fn is_status_accepted(status: &str) -> bool {
    ACCEPTED_TCB_STATUSES.contains(&status)
}

/// Collateral-checked verdict for one quote.
#[derive(Debug, Clone)]
pub struct DcapVerdict {
    /// Raw TCB status string from the verifier (e.g. "UpToDate").
    pub status: String,
    /// Intel security advisories applicable at this TCB level.
    pub advisory_ids: Vec<String>,
    /// The verified TD report body, hex-encoded.
    pub body: TdxQuoteBody,
    /// Whether `status` is in the accepted set.
    pub accepted: bool,
}

/// Verify a quote's signature chain and TCB level against live Intel
/// collateral.
///
/// Returns an error when the quote cannot be cryptographically verified at
/// all (malformed, bad signature, collateral unavailable) or when it does
/// not carry a TDX report body.
pub async fn verify_quote(quote_bytes: &[u8]) -> Result<DcapVerdict, Error> {
    let report = get_collateral_and_verify(quote_bytes, None)
        .await
        .map_err(|e| Error::Dcap(e.to_string()))?;

    let td10 = report
        .report
        .as_td10()
        .cloned()
        .or_else(|| report.report.as_td15().map(|td15| td15.base.clone()))
        .ok_or_else(|| Error::Dcap("quote does not carry a TDX report body".to_string()))?;

    let status = report.status;
    let accepted = is_status_accepted(&status);
    Ok(DcapVerdict {
        accepted,
        status,
        advisory_ids: report.advisory_ids,
        body: body_from_td10(&td10),
    })
}

fn body_from_td10(td: &TDReport10) -> TdxQuoteBody {
    TdxQuoteBody {
        tee_tcb_svn: hex::encode(td.tee_tcb_svn),
        mr_seam: hex::encode(td.mr_seam),
        mr_signer_seam: hex::encode(td.mr_signer_seam),
        seam_attributes: hex::encode(td.seam_attributes),
        td_attributes: hex::encode(td.td_attributes),
        xfam: hex::encode(td.xfam),
        mr_td: hex::encode(td.mr_td),
        mr_config_id: hex::encode(td.mr_config_id),
        mr_owner: hex::encode(td.mr_owner),
        mr_owner_config: hex::encode(td.mr_owner_config),
        rt_mr0: hex::encode(td.rt_mr0),
        rt_mr1: hex::encode(td.rt_mr1),
        rt_mr2: hex::encode(td.rt_mr2),
        rt_mr3: hex::encode(td.rt_mr3),
        report_data: hex::encode(td.report_data),
    }
}
