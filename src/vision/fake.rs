//! In-process [`VisionClient`] for tests: canned reply or error, optional delay.

use super::VisionClient;
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeVision {
    reply: std::result::Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeVision {
    pub fn ok(reply: &str) -> Self {
        Self::with_reply(Ok(reply.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_reply(Err(message.to_string()))
    }

    fn with_reply(reply: std::result::Result<String, String>) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every call before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl VisionClient for FakeVision {
    fn provider(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-vision"
    }

    async fn complete(&self, prompt: &str, _image: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }
}
