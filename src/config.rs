//! Provider settings from the environment and service settings from YAML.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::llm::LlmEngine;

pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";

/// Free-tier models tried in order by the OpenRouter client.
pub const DEFAULT_OPENROUTER_MODELS: &[&str] = &[
    "meta-llama/llama-3.3-70b-instruct:free",
    "google/gemini-2.0-flash-exp:free",
    "mistralai/mistral-small-3.1-24b-instruct:free",
    "qwen/qwen-2.5-72b-instruct:free",
];

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub openrouter_models: Vec<String>,
    pub openrouter_max_model_tries: usize,

    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_image_model: String,

    pub perplexity_api_key: Option<String>,
    pub perplexity_base_url: String,
    pub perplexity_model: String,

    pub timeout: Duration,
}

impl LlmConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let openrouter_models = match get("PUBHUB_OPENROUTER_MODELS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>(),
            None => DEFAULT_OPENROUTER_MODELS
                .iter()
                .map(|m| (*m).to_owned())
                .collect(),
        };
        if openrouter_models.is_empty() {
            anyhow::bail!("PUBHUB_OPENROUTER_MODELS must list at least one model");
        }

        let openrouter_max_model_tries = match get("PUBHUB_OPENROUTER_MAX_MODEL_TRIES") {
            Some(raw) => raw.parse::<usize>().with_context(|| {
                format!("invalid PUBHUB_OPENROUTER_MAX_MODEL_TRIES={raw:?}")
            })?,
            None => 3,
        };
        if openrouter_max_model_tries == 0 {
            anyhow::bail!("PUBHUB_OPENROUTER_MAX_MODEL_TRIES must be > 0");
        }

        let timeout_secs = match get("PUBHUB_LLM_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid PUBHUB_LLM_TIMEOUT_SECS={raw:?}"))?,
            None => 120,
        };

        Ok(Self {
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            openrouter_base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_owned()),
            openrouter_models,
            openrouter_max_model_tries,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_owned()),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_owned()),
            gemini_image_model: get("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| "gemini-2.0-flash-exp-image-generation".to_owned()),
            perplexity_api_key: get("PERPLEXITY_API_KEY"),
            perplexity_base_url: get("PERPLEXITY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PERPLEXITY_BASE_URL.to_owned()),
            perplexity_model: get("PERPLEXITY_MODEL").unwrap_or_else(|| "sonar".to_owned()),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }
}

/// Settings for the long-running service and `scheduler run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub engine: LlmEngine,
    pub max_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("pubhub-data"),
            poll_interval_secs: crate::scheduler::DEFAULT_POLL_INTERVAL.as_secs(),
            engine: LlmEngine::Openrouter,
            max_concurrency: 1,
        }
    }
}

impl AppConfig {
    /// Missing path means defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config: {}", path.display()))?;
                serde_yaml::from_str::<AppConfig>(&raw)
                    .with_context(|| format!("parse config: {}", path.display()))?
            }
            None => AppConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir must be non-empty");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be > 0");
        }
        if self.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be > 0");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
