//! Refresh the local model map from the upstream Tinfoil router config.
//!
//! Run with: cargo run --bin update-config

use anyhow::{Context, Result};
use std::path::Path;

const CONFIG_URL: &str =
    "https://raw.githubusercontent.com/tinfoilsh/confidential-model-router/refs/heads/main/config.yml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config_path =
        std::env::var("VERIFIER_CONFIG_PATH").unwrap_or_else(|_| "config/models.yml".to_string());

    tracing::info!("Updating model configuration from {}", CONFIG_URL);

    let response = reqwest::get(CONFIG_URL)
        .await
        .context("Failed to fetch upstream config")?
        .error_for_status()
        .context("Upstream config request failed")?;
    let contents = response
        .bytes()
        .await
        .context("Failed to read upstream config body")?;

    if let Some(parent) = Path::new(&config_path).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create config directory")?;
    }
    tokio::fs::write(&config_path, &contents)
        .await
        .with_context(|| format!("Failed to write {}", config_path))?;

    tracing::info!("Successfully updated configuration to {}", config_path);
    Ok(())
}
