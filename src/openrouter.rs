//! OpenRouter API client for LLM interactions.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const APP_REFERER: &str = "http://localhost";
const APP_TITLE: &str = "Req Analyzer";
const TEMPERATURE: f32 = 0.2;

/// Failure of the upstream text-generation call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to reach OpenRouter: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("OpenRouter API error ({status}): {details}")]
    Status { status: u16, details: String },
    #[error("failed to decode OpenRouter response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Anything that can turn a system instruction plus a user prompt into raw text.
///
/// The pipeline treats the result as opaque: it may or may not be bare JSON.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, model: &str, messages: Vec<Message>) -> Result<String, UpstreamError>;
}

/// OpenRouter client for chat completions.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
}

impl OpenRouterClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::Transport)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    async fn send_request(&self, request: ChatCompletionRequest) -> Result<String, UpstreamError> {
        debug!("Sending request to OpenRouter: model={}", request.model);

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
            .json(&request)
            .send()
            .await
            .map_err(UpstreamError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                details,
            });
        }

        let response: ChatCompletionResponse =
            response.json().await.map_err(UpstreamError::Decode)?;

        if let Some(usage) = &response.usage {
            info!(
                "OpenRouter response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn complete(&self, model: &str, messages: Vec<Message>) -> Result<String, UpstreamError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature: Some(TEMPERATURE),
            response_format: Some(ResponseFormat::JsonObject),
        };

        self.send_request(request).await
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonObject,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = ChatCompletionRequest {
            model: "deepseek/deepseek-chat".to_string(),
            messages: vec![Message::system("rules"), Message::user("spec")],
            temperature: Some(TEMPERATURE),
            response_format: Some(ResponseFormat::JsonObject),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "deepseek/deepseek-chat");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "spec");
        assert_eq!(value["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_response_without_usage() {
        let raw = r#"{"choices": [{"message": {"content": "{\"processes\": []}"}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(response.usage.is_none());
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some(r#"{"processes": []}"#)
        );
    }
}
