use std::sync::{Arc, LazyLock};

use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::gemini::GeminiClient;
use crate::openrouter::OpenRouterClient;
use crate::perplexity::PerplexityClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LlmEngine {
    /// Deterministic offline output; no network.
    Noop,
    Openrouter,
    Gemini,
    Perplexity,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the model's text output; empty output is an error.
    async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String>;
}

pub fn build_client(engine: LlmEngine, config: &LlmConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match engine {
        LlmEngine::Noop => {
            anyhow::bail!("engine `noop` does not provide a model client; pick a real engine")
        }
        LlmEngine::Openrouter => Arc::new(OpenRouterClient::from_config(config)?),
        LlmEngine::Gemini => Arc::new(GeminiClient::from_config(config)?),
        LlmEngine::Perplexity => Arc::new(PerplexityClient::from_config(config)?),
    };
    Ok(client)
}

pub fn http_client(config: &LlmConfig) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .context("build http client")
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("valid fence regex")
});

/// Parses a JSON value out of free-form model output.
///
/// Fenced blocks are tried first, then the outermost `{...}` or `[...]` span.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    for caps in FENCED_BLOCK.captures_iter(text) {
        let Some(body) = caps.get(1) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<T>(body.as_str().trim()) {
            return Ok(value);
        }
    }

    let span = json_span(text).context("locate json in model output")?;
    serde_json::from_str(span).context("parse json from model output")
}

fn json_span(text: &str) -> anyhow::Result<&str> {
    let start = text
        .find(['{', '['])
        .ok_or_else(|| anyhow::anyhow!("missing `{{` or `[`"))?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text
        .rfind(close)
        .ok_or_else(|| anyhow::anyhow!("missing `{close}`"))?;
    if end <= start {
        anyhow::bail!("invalid json span");
    }
    Ok(&text[start..=end])
}

/// Drops a wrapping code fence, if the whole reply is one.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```")
        && trimmed.ends_with("```")
        && let Some(caps) = FENCED_BLOCK.captures(trimmed)
        && let Some(body) = caps.get(1)
        && caps.get(0).is_some_and(|m| m.len() == trimmed.len())
    {
        return body.as_str().trim().to_owned();
    }
    trimmed.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Plan {
        title: String,
    }

    #[test]
    fn extract_json_reads_fenced_block() {
        let text = "Sure! Here it is:\n```json\n{\"title\": \"Dawn\"}\n```\nEnjoy.";
        let plan: Plan = extract_json(text).unwrap();
        assert_eq!(plan.title, "Dawn");
    }

    #[test]
    fn extract_json_falls_back_to_brace_span() {
        let text = "Outline follows {\"title\": \"Dusk\"} -- hope this helps";
        let plan: Plan = extract_json(text).unwrap();
        assert_eq!(plan.title, "Dusk");
    }

    #[test]
    fn extract_json_skips_unparseable_fences() {
        let text = "```\nnot json\n```\n{\"title\": \"Noon\"}";
        let plan: Plan = extract_json(text).unwrap();
        assert_eq!(plan.title, "Noon");
    }

    #[test]
    fn extract_json_reads_arrays() {
        let titles: Vec<Plan> = extract_json("[{\"title\":\"a\"},{\"title\":\"b\"}]").unwrap();
        assert_eq!(titles.len(), 2);
    }

    #[test]
    fn extract_json_reports_missing_json() {
        let err = extract_json::<Plan>("no structured output here").unwrap_err();
        assert!(format!("{err:#}").contains("locate json"));
    }

    #[test]
    fn strip_code_fences_only_unwraps_full_fence() {
        assert_eq!(strip_code_fences("```markdown\nHello\n```"), "Hello");
        assert_eq!(
            strip_code_fences("Intro\n```\ncode\n```"),
            "Intro\n```\ncode\n```"
        );
    }
}
