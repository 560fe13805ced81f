//! Configuration: the YAML model map plus environment-driven settings.
//!
//! The YAML file (refreshed by the `update-config` tool) maps model names
//! to their enclave hostnames and Sigstore repositories, and carries the
//! Redpill model-ID translation tables. It is loaded once and cached for
//! the process lifetime.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::Error;

/// Default Redpill → Tinfoil model-ID translations, used when the config
/// file does not carry a `redpill_mappings.tinfoil` table.
const DEFAULT_TINFOIL_MAPPINGS: &[(&str, &str)] = &[
    ("qwen/qwen3-coder-480b-a35b-instruct", "qwen3-coder-480b"),
    ("deepseek/deepseek-r1-0528", "deepseek-r1-0528"),
    ("meta-llama/llama-3.3-70b-instruct", "llama3-3-70b"),
    ("moonshotai/kimi-k2-thinking", "kimi-k2-thinking"),
];

/// Default Redpill → NearAI model-ID translations.
const DEFAULT_NEARAI_MAPPINGS: &[(&str, &str)] = &[
    ("z-ai/glm-4.6", "zai-org/GLM-4.6"),
    ("qwen/qwen3-30b-a3b-instruct-2507", "Qwen/Qwen3-30B-A3B-Instruct-2507"),
    ("deepseek/deepseek-chat-v3.1", "deepseek-ai/DeepSeek-V3.1"),
];

/// One model entry in the YAML map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelEntry {
    /// Enclave hostnames serving this model; the first one is used.
    #[serde(default)]
    pub enclaves: Vec<String>,
    /// Sigstore repository slug holding the model's golden measurements.
    #[serde(default)]
    pub repo: Option<String>,
}

/// Redpill model-ID translation tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedpillMappings {
    #[serde(default)]
    pub tinfoil: BTreeMap<String, String>,
    #[serde(default, alias = "near_ai", alias = "near-ai")]
    pub nearai: BTreeMap<String, String>,
}

/// Parsed model configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub models: BTreeMap<String, ModelEntry>,
    #[serde(default)]
    pub redpill_mappings: RedpillMappings,
}

impl ModelConfig {
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load from `path`, or an empty config (with a warning) when the file
    /// is missing — every lookup then fails closed as a miss.
    pub fn load_from(path: &PathBuf) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse model config {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read model config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Process-wide cached config (first use wins).
    pub fn global() -> &'static ModelConfig {
        static CONFIG: OnceLock<ModelConfig> = OnceLock::new();
        CONFIG.get_or_init(|| ModelConfig::load_from(&default_config_path()))
    }

    /// Enclave hostname serving `model_id`.
    pub fn enclave_host(&self, model_id: &str) -> Option<&str> {
        self.models
            .get(model_id)?
            .enclaves
            .first()
            .map(String::as_str)
    }

    /// Sigstore repository slug for `model_id`.
    pub fn repo(&self, model_id: &str) -> Option<&str> {
        self.models.get(model_id)?.repo.as_deref()
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Translate a Redpill model ID to its Tinfoil equivalent.
    pub fn tinfoil_model_for(&self, redpill_id: &str) -> Option<String> {
        lookup_mapping(
            &self.redpill_mappings.tinfoil,
            DEFAULT_TINFOIL_MAPPINGS,
            redpill_id,
        )
    }

    /// Translate a Redpill model ID to its NearAI equivalent.
    pub fn nearai_model_for(&self, redpill_id: &str) -> Option<String> {
        lookup_mapping(
            &self.redpill_mappings.nearai,
            DEFAULT_NEARAI_MAPPINGS,
            redpill_id,
        )
    }
}

fn lookup_mapping(
    configured: &BTreeMap<String, String>,
    defaults: &[(&str, &str)],
    key: &str,
) -> Option<String> {
    if let Some(mapped) = configured.get(key) {
        return Some(mapped.clone());
    }
    defaults
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| to.to_string())
}

fn default_config_path() -> PathBuf {
    env::var("VERIFIER_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/models.yml"))
}

/// Runtime settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the external dstack-verifier service.
    pub dstack_verifier_url: String,
    /// Optional Intel Trust Authority API key enabling ITA appraisal.
    pub ita_api_key: Option<String>,
    /// Path to the YAML model config.
    pub config_path: PathBuf,
}

impl Settings {
    /// Load settings from the environment (and `.env` if present).
    ///
    /// Optional environment variables:
    /// - DSTACK_VERIFIER_URL: dstack-verifier base URL (default: http://localhost:8080)
    /// - INTEL_TRUST_AUTHORITY_API_KEY: enables the ITA side-check
    /// - VERIFIER_CONFIG_PATH: model config path (default: config/models.yml)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let dstack_verifier_url = env::var("DSTACK_VERIFIER_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let ita_api_key = env::var("INTEL_TRUST_AUTHORITY_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        let settings = Self {
            dstack_verifier_url,
            ita_api_key,
            config_path: default_config_path(),
        };
        settings.validate().context("invalid settings")?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dstack_verifier_url.is_empty() {
            anyhow::bail!("dstack verifier URL cannot be empty");
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dstack_verifier_url: "http://localhost:8080".to_string(),
            ita_api_key: None,
            config_path: PathBuf::from("config/models.yml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
models:
  llama3-3-70b:
    enclaves:
      - llama3-3-70b.model.tinfoil.sh
    repo: tinfoilsh/confidential-llama3-3-70b
  doc-upload:
    enclaves:
      - doc-upload.tinfoil.sh
    repo: tinfoilsh/doc-upload
  bare-model: {}
redpill_mappings:
  tinfoil:
    acme/some-model: some-model
  nearai:
    acme/other-model: Acme/Other-Model
"#;

    #[test]
    fn test_parses_model_map() {
        let config = ModelConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.enclave_host("llama3-3-70b"),
            Some("llama3-3-70b.model.tinfoil.sh")
        );
        assert_eq!(config.repo("doc-upload"), Some("tinfoilsh/doc-upload"));
        assert_eq!(config.enclave_host("bare-model"), None);
        assert_eq!(config.enclave_host("missing"), None);
    }

    #[test]
    fn test_configured_mappings_win() {
        let config = ModelConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.tinfoil_model_for("acme/some-model").as_deref(),
            Some("some-model")
        );
        assert_eq!(
            config.nearai_model_for("acme/other-model").as_deref(),
            Some("Acme/Other-Model")
        );
    }

    #[test]
    fn test_default_mappings_fill_gaps() {
        let config = ModelConfig::default();
        assert_eq!(
            config
                .tinfoil_model_for("meta-llama/llama-3.3-70b-instruct")
                .as_deref(),
            Some("llama3-3-70b")
        );
        assert_eq!(
            config.nearai_model_for("z-ai/glm-4.6").as_deref(),
            Some("zai-org/GLM-4.6")
        );
        assert_eq!(config.tinfoil_model_for("unknown/model"), None);
    }

    #[test]
    fn test_empty_yaml_is_valid() {
        let config = ModelConfig::from_yaml("{}").unwrap();
        assert!(config.models.is_empty());
    }
}
