//! OpenRouter vision backend (OpenAI-compatible chat completions).

use super::{sniff_media_type, VisionClient};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.2-11b-vision-instruct";

/// OpenRouter client for chat completions.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    /// Create a new client, reading API key from OPENROUTER_API_KEY env var.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable not set")?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Create a client with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request(&self, prompt: &str, image: &[u8]) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user_with_image(prompt, image)],
            max_tokens: Some(4096),
        }
    }
}

#[async_trait::async_trait]
impl VisionClient for OpenRouterClient {
    fn provider(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, image: &[u8]) -> Result<String> {
        debug!("Sending request to OpenRouter: model={}", self.model);

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.build_request(prompt, image))
            .send()
            .await
            .context("Failed to send request to OpenRouter")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter API error ({}): {}", status, error_text);
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter response")?;

        if let Some(usage) = &response.usage {
            info!(
                "OpenRouter response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OpenRouter response has no content")
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
    max_tokens: Option<u32>,
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

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

impl Message {
    /// User message with the prompt text followed by the image as a base64 data URL.
    fn user_with_image(text: &str, image: &[u8]) -> Self {
        let data_url = format!(
            "data:{};base64,{}",
            sniff_media_type(image),
            BASE64.encode(image)
        );

        Self {
            role: "user",
            content: vec![
                ContentPart::Text {
                    text: text.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenRouterClient {
        OpenRouterClient {
            client: Client::new(),
            api_key: "test".to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    #[test]
    fn test_request_shape() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0];
        let request = client().with_model("some/vision-model").build_request("extract", &jpeg);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "some/vision-model");
        let content = &json["messages"][0]["content"];
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "extract");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,/9j/4A==");
    }

    #[test]
    fn test_response_without_usage() {
        let raw = r#"{"choices":[{"message":{"content":"- **NR**: 123"}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(response.usage.is_none());
        assert_eq!(response.choices[0].message.content.as_deref(), Some("- **NR**: 123"));
    }
}
