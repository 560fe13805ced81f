//! Service providers: fetch attestation reports from the inference
//! platforms and list their models.
//!
//! These are the engine's only outward-facing report fetchers; everything
//! they return is normalised into an [`crate::types::AttestationReport`]
//! before verification.

pub mod nearai;
pub mod redpill;
pub mod tinfoil;

pub use nearai::NearaiProvider;
pub use redpill::RedpillProvider;
pub use tinfoil::TinfoilProvider;

use rand::RngCore;

/// Generate a random 32-byte request nonce as hex (64 chars).
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
