use thiserror::Error;

/// Errors surfaced by the verification engine's fallible building blocks.
///
/// Verifiers themselves never bubble these to callers: every failure is
/// folded into a `VerificationResult` with `model_verified = false` so the
/// caller always gets a verdict plus diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    #[error("TDX quote too short: {0} bytes (need at least 632)")]
    QuoteMalformed(usize),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DCAP verification failed: {0}")]
    Dcap(String),

    #[error("{0}")]
    LookupMiss(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),
}
