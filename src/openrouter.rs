use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::StatusCode;

use crate::chat;
use crate::config::LlmConfig;
use crate::llm::{LlmClient, Prompt};

const REFERER: &str = "https://github.com/pubhub/pubhub";
const APP_TITLE: &str = "PubHub";

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    models: Vec<String>,
    max_model_tries: usize,
}

impl OpenRouterClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
        models: Vec<String>,
        max_model_tries: usize,
    ) -> anyhow::Result<Self> {
        if models.is_empty() {
            anyhow::bail!("openrouter client needs at least one model");
        }
        Ok(Self {
            client,
            endpoint: chat::completions_endpoint(base_url),
            api_key: api_key.into(),
            models,
            max_model_tries: max_model_tries.max(1),
        })
    }

    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = config
            .openrouter_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("OPENROUTER_API_KEY is not set"))?;
        Self::new(
            crate::llm::http_client(config)?,
            &config.openrouter_base_url,
            api_key,
            config.openrouter_models.clone(),
            config.openrouter_max_model_tries,
        )
    }

    /// Models that will actually be tried, in order.
    pub fn rotation(&self) -> &[String] {
        let tries = self.max_model_tries.min(self.models.len());
        &self.models[..tries]
    }

    async fn try_model(&self, model: &str, prompt: &Prompt) -> Result<String, Attempt> {
        let body = chat::request_body(model, prompt);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|err| Attempt::Rotate(format!("POST {}: {err}", self.endpoint)))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|err| Attempt::Rotate(format!("read response body: {err}")))?;

        if !status.is_success() {
            let message = chat::parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            let failure = format!("OpenRouter API error ({status}): {message}");
            return Err(if is_fatal_status(status) {
                Attempt::Fatal(failure)
            } else {
                Attempt::Rotate(failure)
            });
        }

        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|err| Attempt::Rotate(format!("parse OpenRouter response: {err}")))?;
        if let Some(message) = chat::error_message(&value) {
            return Err(Attempt::Rotate(format!("OpenRouter returned error: {message}")));
        }
        chat::extract_content(&value)
            .ok_or_else(|| Attempt::Rotate("OpenRouter returned empty content".to_owned()))
    }
}

enum Attempt {
    Rotate(String),
    Fatal(String),
}

fn is_fatal_status(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String> {
        let rotation = self.rotation();
        let mut last_failure = None;

        for (idx, model) in rotation.iter().enumerate() {
            tracing::debug!(
                engine = "openrouter",
                model = %model,
                attempt = idx + 1,
                attempts = rotation.len(),
                "llm request"
            );
            match self.try_model(model, prompt).await {
                Ok(text) => {
                    if idx > 0 {
                        tracing::info!(engine = "openrouter", model = %model, "model rotation succeeded");
                    }
                    return Ok(text);
                }
                Err(Attempt::Fatal(failure)) => {
                    return Err(anyhow::anyhow!(failure))
                        .with_context(|| format!("call OpenRouter model {model}"));
                }
                Err(Attempt::Rotate(failure)) => {
                    tracing::warn!(
                        engine = "openrouter",
                        model = %model,
                        attempt = idx + 1,
                        attempts = rotation.len(),
                        error = %failure,
                        "model failed; rotating"
                    );
                    last_failure = Some(failure);
                }
            }
        }

        anyhow::bail!(
            "all {} OpenRouter model tries failed; last error: {}",
            rotation.len(),
            last_failure.unwrap_or_else(|| "none".to_owned())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(models: &[&str], tries: usize) -> OpenRouterClient {
        OpenRouterClient::new(
            reqwest::Client::new(),
            "http://localhost/api/v1/",
            "key",
            models.iter().map(|m| (*m).to_owned()).collect(),
            tries,
        )
        .unwrap()
    }

    #[test]
    fn rotation_is_capped_by_ceiling_and_model_count() {
        assert_eq!(client(&["a", "b", "c"], 2).rotation(), ["a", "b"]);
        assert_eq!(client(&["a", "b"], 5).rotation(), ["a", "b"]);
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            client(&["a"], 1).endpoint,
            "http://localhost/api/v1/chat/completions"
        );
    }

    #[test]
    fn auth_failures_stop_rotation() {
        assert!(is_fatal_status(StatusCode::UNAUTHORIZED));
        assert!(!is_fatal_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_fatal_status(StatusCode::BAD_GATEWAY));
    }
}
