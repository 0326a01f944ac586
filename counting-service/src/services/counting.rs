//! The counting exercise pipeline.
//!
//! prompt → image → store → count check, plus reading back the latest image.

use crate::models::{CountingPrompt, GeneratedImage, QuestionKind};
use crate::services::metrics;
use crate::services::providers::{
    ImageAttachment, ImageParams, ImageProvider, ProviderError, TextProvider,
};
use crate::services::store::ImageStore;
use image::ImageFormat;
use service_core::error::AppError;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one full generation run.
#[derive(Debug, Clone)]
pub struct GeneratedQuestion {
    /// Vision model's answer to the question.
    pub result: String,
    pub object1: String,
    pub object2: String,
    pub question_string: String,
    pub image_url: String,
    pub image: GeneratedImage,
}

#[derive(Clone)]
pub struct CountingPipeline {
    prompt_provider: Arc<dyn TextProvider>,
    vision_provider: Arc<dyn TextProvider>,
    image_provider: Arc<dyn ImageProvider>,
    store: Arc<dyn ImageStore>,
    image_params: ImageParams,
}

impl CountingPipeline {
    pub fn new(
        prompt_provider: Arc<dyn TextProvider>,
        vision_provider: Arc<dyn TextProvider>,
        image_provider: Arc<dyn ImageProvider>,
        store: Arc<dyn ImageStore>,
        image_params: ImageParams,
    ) -> Self {
        Self {
            prompt_provider,
            vision_provider,
            image_provider,
            store,
            image_params,
        }
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    /// Ask the language model for a counting sentence naming two objects.
    pub async fn generate_prompt(&self) -> Result<CountingPrompt, AppError> {
        let template = QuestionKind::Counting
            .templates()
            .first()
            .copied()
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("No counting templates")))?;
        let text = self
            .generate_text(
                "gemini",
                self.prompt_provider.as_ref(),
                template.instruction(),
                &[],
            )
            .await?;

        let prompt = CountingPrompt::parse(&text);
        tracing::info!(
            kind = ?template.kind(),
            template = template.key(),
            generated_text = %prompt.generated_text,
            object1 = ?prompt.object1,
            object2 = ?prompt.object2,
            "Generated counting prompt"
        );

        Ok(prompt)
    }

    /// Run the whole pipeline for a user and return the stored question.
    pub async fn generate_question_image(&self, uid: &str) -> Result<GeneratedQuestion, AppError> {
        let uid = require_uid(uid)?;

        let prompt = self.generate_prompt().await?;
        let (object1, object2) = prompt.objects().ok_or_else(|| {
            tracing::warn!(generated_text = %prompt.generated_text, "Prompt did not name two objects");
            AppError::BadGateway("language model response did not name two objects".to_string())
        })?;

        let image_prompt = CountingPrompt::image_prompt(object1, object2);
        let started = Instant::now();
        let output = self
            .image_provider
            .generate(&image_prompt, &self.image_params)
            .await
            .map_err(|e| provider_failure("flux", e))?;
        metrics::record_provider_call("flux", self.image_provider.model(), started.elapsed());

        let image = self
            .store
            .append_image(uid, &prompt.generated_text, output.bytes.clone())
            .await?;
        metrics::record_image_stored();
        tracing::info!(uid = %uid, index = image.index, image_url = %output.source_url, "Saved generated image");

        let question_string = CountingPrompt::question_string(object1, object2);
        let result = self
            .generate_text(
                "gemini",
                self.vision_provider.as_ref(),
                &format!("\n\n{}", question_string),
                &[ImageAttachment::from_bytes(output.bytes)],
            )
            .await?;

        Ok(GeneratedQuestion {
            result,
            object1: object1.to_string(),
            object2: object2.to_string(),
            question_string,
            image_url: output.source_url,
            image,
        })
    }

    /// Latest stored image for the user, re-encoded as JPEG.
    pub async fn latest_image_jpeg(&self, uid: &str) -> Result<Vec<u8>, AppError> {
        let uid = require_uid(uid)?;

        let document = self
            .store
            .find(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("UID not found")))?;

        let latest = document
            .latest()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No images found for this UID")))?;

        let bytes = latest
            .image_bytes()
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("No image data found for this UID"))
            })?
            .to_vec();

        tokio::task::spawn_blocking(move || encode_jpeg(&bytes))
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Image task failed: {}", e)))?
    }

    async fn generate_text(
        &self,
        provider_name: &'static str,
        provider: &dyn TextProvider,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<String, AppError> {
        let started = Instant::now();
        let response = provider
            .generate(prompt, images)
            .await
            .map_err(|e| provider_failure(provider_name, e))?;
        metrics::record_provider_call(provider_name, provider.model(), started.elapsed());

        tracing::debug!(
            model = %provider.model(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Text generation finished"
        );

        response.text.ok_or_else(|| {
            AppError::BadGateway(format!("{} returned no text", provider.model()))
        })
    }
}

fn provider_failure(provider: &'static str, err: ProviderError) -> AppError {
    tracing::error!(provider, error = %err, "AI provider call failed");
    metrics::record_provider_error(provider, err.kind());
    AppError::from(err)
}

/// Blank uids are rejected; others are used exactly as sent.
fn require_uid(uid: &str) -> Result<&str, AppError> {
    if uid.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("UID is required")));
    }
    Ok(uid)
}

/// Decode any supported image format and re-encode it as baseline JPEG.
pub fn encode_jpeg(bytes: &[u8]) -> Result<Vec<u8>, AppError> {
    let processing_error =
        |e: image::ImageError| AppError::InternalError(anyhow::anyhow!("Error processing image: {}", e));

    let decoded = image::load_from_memory(bytes).map_err(processing_error)?;

    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut output = Cursor::new(Vec::new());
    rgb.write_to(&mut output, ImageFormat::Jpeg)
        .map_err(processing_error)?;

    Ok(output.into_inner())
}
