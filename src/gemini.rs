use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::llm::{LlmClient, Prompt};

pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    image_model: String,
    base_delay: Duration,
}

impl GeminiClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            image_model: model.clone(),
            model,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = config
            .gemini_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
        Ok(Self::new(
            crate::llm::http_client(config)?,
            &config.gemini_base_url,
            api_key,
            config.gemini_model.clone(),
        )
        .with_image_model(config.gemini_image_model.clone()))
    }

    pub fn with_image_model(mut self, image_model: impl Into<String>) -> Self {
        self.image_model = image_model.into();
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    /// Posts with exponential backoff on 429 and transport errors.
    async fn generate(&self, model: &str, body: &Value) -> anyhow::Result<Value> {
        let endpoint = self.endpoint(model);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = self
                .client
                .post(&endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(body)
                .send()
                .await;

            let retry_reason = match outcome {
                Err(err) => format!("POST {endpoint}: {err}"),
                Ok(response) => {
                    let status = response.status();
                    let raw = response.text().await.context("read Gemini response body")?;
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        format!("Gemini rate limited ({status})")
                    } else if !status.is_success() {
                        let message =
                            crate::chat::parse_error_message(&raw).unwrap_or_else(|| raw.clone());
                        anyhow::bail!("Gemini API error ({status}): {message}");
                    } else {
                        return serde_json::from_str(&raw).context("parse Gemini response");
                    }
                }
            };

            if attempt >= MAX_ATTEMPTS {
                anyhow::bail!("Gemini request failed after {attempt} attempts: {retry_reason}");
            }
            let delay = self.base_delay * 2u32.pow(attempt - 1);
            tracing::warn!(
                engine = "gemini",
                model,
                attempt,
                attempts = MAX_ATTEMPTS,
                delay_ms = delay.as_millis() as u64,
                reason = %retry_reason,
                "retrying with backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Experimental: asks the image model for a picture.
    pub async fn generate_image(&self, prompt: &str) -> anyhow::Result<GeneratedImage> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });
        let value = self.generate(&self.image_model, &body).await?;
        extract_inline_image(&value).context("extract image from Gemini response")
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String> {
        let mut generation_config = serde_json::json!({ "temperature": prompt.temperature });
        if let Some(max_tokens) = prompt.max_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max_tokens);
        }
        let mut body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
            "generationConfig": generation_config,
        });
        if let Some(system) = prompt.system.as_deref() {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }

        tracing::debug!(engine = "gemini", model = %self.model, "llm request");
        let value = self.generate(&self.model, &body).await?;
        extract_text(&value)
    }
}

fn candidate_parts(value: &Value) -> anyhow::Result<&Vec<Value>> {
    value
        .pointer("/candidates/0/content/parts")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            let reason = value
                .pointer("/promptFeedback/blockReason")
                .and_then(|v| v.as_str())
                .unwrap_or("no candidates");
            anyhow::anyhow!("Gemini returned no content ({reason})")
        })
}

fn extract_text(value: &Value) -> anyhow::Result<String> {
    let text = candidate_parts(value)?
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect::<String>();
    if text.trim().is_empty() {
        anyhow::bail!("Gemini output text is empty");
    }
    Ok(text)
}

/// Decoded `inlineData` from an image response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// `inlineData.mimeType` as reported by the API.
    pub mime_type: Option<String>,
}

fn extract_inline_image(value: &Value) -> anyhow::Result<GeneratedImage> {
    let inline = candidate_parts(value)?
        .iter()
        .find_map(|part| part.get("inlineData").filter(|d| d.get("data").is_some()))
        .ok_or_else(|| anyhow::anyhow!("no inline image data in response"))?;
    let data = inline
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("inline image data is not a string"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .context("decode base64 image data")?;
    Ok(GeneratedImage {
        bytes,
        mime_type: inline
            .get("mimeType")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}
