//! OpenAI-compatible `/chat/completions` bodies, shared by OpenRouter and Perplexity.
use serde_json::Value;

use crate::llm::Prompt;

pub fn completions_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

pub fn request_body(model: &str, prompt: &Prompt) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = prompt.system.as_deref() {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": prompt.user }));

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": prompt.temperature,
    });
    if let Some(max_tokens) = prompt.max_tokens
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert("max_tokens".to_owned(), serde_json::json!(max_tokens));
    }
    body
}

pub fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    error_message(&value)
}

pub fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

/// Text of the first choice, or `None` when missing or blank.
pub fn extract_content(value: &Value) -> Option<String> {
    let content = value
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()?;
    if content.trim().is_empty() {
        return None;
    }
    Some(content.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_includes_system_message_first() {
        let prompt = Prompt::new("Write").with_system("You are terse.").with_max_tokens(64);
        let body = request_body("m/one", &prompt);
        assert_eq!(body["model"], "m/one");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Write");
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn extract_content_treats_blank_as_missing() {
        let value = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "   " } }]
        });
        assert!(extract_content(&value).is_none());
    }

    #[test]
    fn error_message_falls_back_to_raw_error() {
        let value = serde_json::json!({ "error": { "code": 502 } });
        assert_eq!(error_message(&value).unwrap(), "{\"code\":502}");
    }
}
