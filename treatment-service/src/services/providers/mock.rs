//! Mock provider implementation for testing.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// What the mock answers with.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this text.
    Text(String),
    /// Succeed with no text.
    Empty,
    /// Fail with this error.
    Fail(ProviderError),
}

/// Mock text provider for testing.
pub struct MockTextProvider {
    behavior: MockBehavior,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl MockTextProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(MockBehavior::Text(text.into()))
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(MockBehavior::Fail(error))
    }

    /// Simulate provider latency on every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let input_tokens = prompt.len() as i32 / 4;

        match &self.behavior {
            MockBehavior::Text(text) => Ok(ProviderResponse {
                text: Some(text.clone()),
                input_tokens,
                output_tokens: text.len() as i32 / 4,
                finish_reason: FinishReason::Complete,
            }),
            MockBehavior::Empty => Ok(ProviderResponse {
                text: None,
                input_tokens,
                output_tokens: 0,
                finish_reason: FinishReason::Complete,
            }),
            MockBehavior::Fail(err) => Err(err.clone()),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match &self.behavior {
            MockBehavior::Fail(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }
}
