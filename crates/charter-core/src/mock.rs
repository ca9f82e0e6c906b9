//! Test-only scripted LLM provider.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::{Error, GenerationConfig, GenerationResult, LLMProvider, Result};

type Handler = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Returns scripted responses and records every prompt it receives.
///
/// Response precedence: the handler (if any), then queued responses in
/// order, then `default_response`.
#[derive(Clone)]
pub struct MockLlm {
    responses: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    handler: Option<Arc<Handler>>,
    pub default_response: String,
    pub fail: bool,
    /// Milliseconds to sleep before answering.
    pub delay_ms: u64,
}

impl Default for MockLlm {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            handler: None,
            default_response: "mock response".to_string(),
            fail: false,
            delay_ms: 0,
        }
    }
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Answer every prompt through `handler`
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Every prompt received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("mock prompt log poisoned").clone()
    }

    fn respond(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("mock prompt log poisoned")
            .push(prompt.to_string());

        if self.fail {
            return Err(Error::Generation("mock LLM error".to_string()));
        }
        if let Some(handler) = &self.handler {
            return handler(prompt);
        }

        let mut responses = self.responses.lock().expect("mock responses poisoned");
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}

#[async_trait]
impl LLMProvider for MockLlm {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        self.generate_with_config(prompt, &GenerationConfig::default())
            .await
    }

    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let text = self.respond(prompt)?;
        Ok(GenerationResult {
            text,
            model_id: config.model_id.clone(),
            tokens_used: None,
        })
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}
