use anyhow::Context as _;
use async_trait::async_trait;

use crate::chat;
use crate::config::LlmConfig;
use crate::llm::{LlmClient, Prompt};

#[derive(Debug, Clone)]
pub struct PerplexityClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl PerplexityClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: chat::completions_endpoint(base_url),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = config
            .perplexity_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("PERPLEXITY_API_KEY is not set"))?;
        Ok(Self::new(
            crate::llm::http_client(config)?,
            &config.perplexity_base_url,
            api_key,
            config.perplexity_model.clone(),
        ))
    }
}

#[async_trait]
impl LlmClient for PerplexityClient {
    async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String> {
        tracing::debug!(engine = "perplexity", model = %self.model, "llm request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&chat::request_body(&self.model, prompt))
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read Perplexity response body")?;
        if !status.is_success() {
            let message = chat::parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("Perplexity API error ({status}): {message}");
        }

        let value: serde_json::Value =
            serde_json::from_str(&raw).context("parse Perplexity response")?;
        chat::extract_content(&value).ok_or_else(|| anyhow::anyhow!("Perplexity output is empty"))
    }
}
