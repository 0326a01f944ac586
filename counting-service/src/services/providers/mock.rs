//! Mock provider implementations for testing.

use super::{
    ImageAttachment, ImageOutput, ImageParams, ImageProvider, ProviderError, ProviderResponse,
    TextProvider,
};
use async_trait::async_trait;
use std::sync::Mutex;

/// A prompt the mock text provider received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPrompt {
    pub prompt: String,
    pub image_count: usize,
}

/// Mock text provider returning a fixed reply.
pub struct MockTextProvider {
    model: String,
    reply: Option<String>,
    calls: Mutex<Vec<RecordedPrompt>>,
}

impl MockTextProvider {
    pub fn new(model: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reply: Some(reply.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A provider that fails every call as not configured.
    pub fn disabled(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedPrompt> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedPrompt {
                prompt: prompt.to_string(),
                image_count: images.len(),
            });
        }

        let reply = self.reply.clone().ok_or_else(|| {
            ProviderError::NotConfigured("Mock text provider not enabled".to_string())
        })?;

        Ok(ProviderResponse {
            input_tokens: prompt.len() as i32 / 4,
            output_tokens: reply.len() as i32 / 4,
            text: Some(reply),
        })
    }
}

/// Mock image provider returning fixed bytes.
pub struct MockImageProvider {
    bytes: Option<Vec<u8>>,
    prompts: Mutex<Vec<String>>,
}

impl MockImageProvider {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Some(bytes),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose jobs never finish.
    pub fn timing_out() -> Self {
        Self {
            bytes: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    fn model(&self) -> &str {
        "mock-image"
    }

    async fn generate(
        &self,
        prompt: &str,
        _params: &ImageParams,
    ) -> Result<ImageOutput, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let bytes = self.bytes.clone().ok_or_else(|| {
            ProviderError::Timeout("Mock image task never became ready".to_string())
        })?;

        Ok(ImageOutput {
            bytes,
            source_url: "https://images.test/sample.jpeg".to_string(),
        })
    }
}
