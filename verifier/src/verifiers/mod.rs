//! Verifier pipeline stages.
//!
//! Helper verifiers (internal building blocks):
//! - [`intel::IntelTdxVerifier`]: collateral-checked Intel TDX baseline
//!
//! User-facing verifiers (what reports actually route to):
//! - [`tinfoil::TinfoilVerifier`]: baseline + hardware pin + Sigstore manifest pin
//! - [`redpill::RedpillVerifier`]: catalog-routed Tinfoil/NearAI/Phala pipelines
//! - [`nearai::NearAiVerifier`]: multi-component gateway + model verification
//! - [`phala::PhalaVerifier`]: Phala Cloud app/KMS/gateway fan-out

pub mod intel;
pub mod nearai;
pub mod phala;
pub mod redpill;
pub mod tinfoil;

pub use intel::IntelTdxVerifier;
pub use nearai::NearAiVerifier;
pub use phala::PhalaVerifier;
pub use redpill::{RedpillEvidence, RedpillVerifier};
pub use tinfoil::TinfoilVerifier;
