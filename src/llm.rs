//! Model Invoker
//!
//! `ModelInvoker` is the seam between the pipeline and whatever model produces
//! SQL. `LlmClient` is the production implementation: a single OpenAI-compatible
//! chat-completions call (OpenRouter by default).

use crate::config::LlmConfig;
use crate::error::{Nl2SqlError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// False when no usable credentials are present. Checked before any call.
    fn is_configured(&self) -> bool;

    /// Send the prompt pair and return the raw completion text.
    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Nl2SqlError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmConfig::from_env())
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "top_p": self.config.top_p,
        })
    }
}

#[async_trait]
impl ModelInvoker for LlmClient {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let api_key = match &self.config.api_key {
            Some(key) if self.config.is_configured() => key,
            _ => {
                return Err(Nl2SqlError::NotConfigured(
                    "OPENROUTER_API_KEY is missing or a placeholder".to_string(),
                ))
            }
        };

        debug!("Calling {} with model {}", self.config.base_url, self.config.model);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(system_prompt, user_prompt))
            .send()
            .await
            .map_err(|e| Nl2SqlError::UpstreamFailure(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Nl2SqlError::UpstreamFailure(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| {
                Nl2SqlError::UpstreamFailure(format!("Failed to parse LLM response: {}", e))
            })?;

        extract_content(&response_json)
    }
}

/// Pull the completion text out of a chat-completions response body.
pub fn extract_content(response_json: &Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(Nl2SqlError::UpstreamFailure(format!("LLM API error: {}", error)));
    }

    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| {
            Nl2SqlError::UpstreamFailure("No choices array in LLM response".to_string())
        })?;

    let first = choices
        .first()
        .ok_or_else(|| {
            Nl2SqlError::UpstreamFailure("Empty choices array in LLM response".to_string())
        })?;

    match first.get("finish_reason").and_then(|r| r.as_str()) {
        Some("content_filter") => {
            return Err(Nl2SqlError::UpstreamFailure(
                "LLM response was filtered by content policy".to_string(),
            ))
        }
        Some("length") => warn!("LLM response was truncated due to length limit"),
        _ => {}
    }

    let content = first["message"]["content"]
        .as_str()
        .ok_or_else(|| Nl2SqlError::UpstreamFailure("No content in LLM response".to_string()))?
        .trim();

    if content.is_empty() {
        return Err(Nl2SqlError::UpstreamFailure("Empty content in LLM response".to_string()));
    }

    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_content_trims() {
        let body = json!({
            "choices": [{"message": {"content": "  SELECT 1 FROM t\n"}, "finish_reason": "stop"}]
        });
        assert_eq!(extract_content(&body).unwrap(), "SELECT 1 FROM t");
    }

    #[test]
    fn test_extract_content_failures() {
        let cases = [
            json!({"error": {"message": "rate limited"}}),
            json!({"choices": []}),
            json!({"id": "x"}),
            json!({"choices": [{"message": {"content": "x"}, "finish_reason": "content_filter"}]}),
            json!({"choices": [{"message": {"content": "   "}}]}),
            json!({"choices": [{"message": {}}]}),
        ];
        for body in cases {
            assert!(
                matches!(extract_content(&body), Err(Nl2SqlError::UpstreamFailure(_))),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn test_truncated_completion_still_returned() {
        let body = json!({
            "choices": [{"message": {"content": "SELECT a FROM t WHERE"}, "finish_reason": "length"}]
        });
        assert_eq!(extract_content(&body).unwrap(), "SELECT a FROM t WHERE");
    }

    #[test]
    fn test_request_body_carries_sampling_settings() {
        let client = LlmClient::new(LlmConfig::default()).unwrap();
        let body = client.request_body("sys", "user");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["model"], client.config().model.as_str());
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses_to_call() {
        let mut config = LlmConfig::default();
        config.api_key = Some(crate::config::PLACEHOLDER_API_KEY.to_string());
        let client = LlmClient::new(config).unwrap();
        assert!(matches!(
            client.invoke("sys", "user").await,
            Err(Nl2SqlError::NotConfigured(_))
        ));
    }
}
