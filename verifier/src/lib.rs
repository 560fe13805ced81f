//! Confidential AI attestation verification engine.
//!
//! Verifies that an AI inference service really runs inside the trusted
//! execution environment it claims: Intel TDX quotes are validated through
//! DCAP with live Intel collateral, measurement registers are pinned
//! against provider policy and Sigstore-published golden values, dstack
//! environments are checked through the external dstack-verifier, GPU
//! evidence goes to NVIDIA NRAS, and the quote's report_data is bound to
//! the caller's nonce and the response-signing address.
//!
//! Entry point: [`sdk::TeeVerifier`], which fetches provider reports and
//! routes them to the right verifier pipeline.

pub mod config;
pub mod dcap;
pub mod dstack;
pub mod error;
pub mod ita;
pub mod jwt;
pub mod nvidia;
pub mod providers;
pub mod quote;
pub mod report_data;
pub mod sdk;
pub mod sigstore;
pub mod types;
pub mod verifiers;

pub use error::Error;
pub use sdk::TeeVerifier;
pub use types::{AttestationReport, HardwareType, Provider, QuoteInput, VerificationResult};
