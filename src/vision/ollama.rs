//! Ollama vision backend (native `/api/chat` endpoint).

use super::VisionClient;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2-vision";

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    host: String,
    model: String,
}

impl OllamaClient {
    /// Create a client, reading the server address from OLLAMA_HOST.
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        Self::new(host)
    }

    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host)
    }

    fn build_request(&self, prompt: &str, image: &[u8]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
                images: vec![BASE64.encode(image)],
            }],
            stream: false,
        }
    }
}

// ── Ollama API request/response types ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

fn parse_chat_response(raw: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(raw).context("Failed to parse Ollama response")?;

    if let Some(error) = response.error {
        anyhow::bail!("Ollama error: {}", error);
    }

    debug!(
        "Ollama usage: prompt={:?} completion={:?}",
        response.prompt_eval_count, response.eval_count
    );

    response
        .message
        .map(|m| m.content)
        .context("Ollama response has no message")
}

// ── Client implementation ───────────────────────────────────────────────────

#[async_trait::async_trait]
impl VisionClient for OllamaClient {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, image: &[u8]) -> Result<String> {
        info!(
            "OllamaClient: calling {} with model={} ({} image bytes)",
            self.chat_url(),
            self.model,
            image.len()
        );

        let response = self
            .client
            .post(self.chat_url())
            .json(&self.build_request(prompt, image))
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("Ollama API error ({}): {}", status, raw);
        }

        debug!(
            "OllamaClient: raw response ({} bytes): {}",
            raw.len(),
            raw.chars().take(500).collect::<String>()
        );
        parse_chat_response(&raw)
    }
}
