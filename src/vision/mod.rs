//! Vision-language model backends.
//!
//! Defines the [`VisionClient`] trait so the extraction flow can send one
//! prompt plus one image to either a local Ollama server or OpenRouter.

pub mod ollama;
pub mod openrouter;

#[cfg(test)]
pub mod fake;

use crate::config::Settings;
use std::sync::Arc;

/// Async trait implemented by each model backend.
#[async_trait::async_trait]
pub trait VisionClient: Send + Sync {
    /// Backend identifier ("ollama", "openrouter").
    fn provider(&self) -> &str;

    /// Model identifier sent with every request.
    fn model(&self) -> &str;

    /// Send `prompt` with `image` as a single user message and return the
    /// model's text response verbatim.
    async fn complete(&self, prompt: &str, image: &[u8]) -> anyhow::Result<String>;
}

/// Known backend identifiers used for selection from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisionProviderKind {
    Ollama,
    OpenRouter,
}

impl VisionProviderKind {
    /// Parse a configuration string into a provider kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }
}

/// Build the configured backend.
pub fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn VisionClient>> {
    let client: Arc<dyn VisionClient> = match settings.provider {
        VisionProviderKind::Ollama => {
            let mut client = ollama::OllamaClient::from_env();
            if let Some(model) = &settings.model {
                client = client.with_model(model.clone());
            }
            Arc::new(client)
        }
        VisionProviderKind::OpenRouter => {
            let mut client = openrouter::OpenRouterClient::from_env()?;
            if let Some(model) = &settings.model {
                client = client.with_model(model.clone());
            }
            Arc::new(client)
        }
    };
    Ok(client)
}

/// MIME type of an image payload, sniffed from its magic bytes.
///
/// Used for data URLs and previews only; unknown formats are still forwarded.
pub fn sniff_media_type(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        Ok(image::ImageFormat::Tiff) => "image/tiff",
        _ => "application/octet-stream",
    }
}
