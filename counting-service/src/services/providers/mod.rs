//! AI provider abstractions and implementations.
//!
//! Text generation (Gemini) and image generation (Flux) sit behind traits so
//! the pipeline can run against mocks in tests.

pub mod flux;
pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use service_core::error::AppError;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidResponse(_) => "invalid_response",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::Timeout(_) => "timeout",
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited => {
                AppError::TooManyRequests("Upstream AI provider is rate limiting".to_string(), None)
            }
            ProviderError::Timeout(msg) => AppError::GatewayTimeout(msg),
            ProviderError::NotConfigured(msg) => {
                tracing::error!(reason = %msg, "AI provider not configured");
                AppError::ServiceUnavailable
            }
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

/// Result of a text generation call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: Option<String>,

    /// Input tokens consumed.
    pub input_tokens: i32,

    /// Output tokens generated.
    pub output_tokens: i32,
}

/// Image passed inline to a multimodal model.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageAttachment {
    /// Wrap raw bytes, sniffing PNG/WebP and defaulting to JPEG.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            "image/png"
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            "image/webp"
        } else {
            "image/jpeg"
        };

        Self {
            mime_type: mime_type.to_string(),
            data,
        }
    }
}

/// Trait for text generation providers (e.g., Gemini).
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Model identifier, used in logs and metrics.
    fn model(&self) -> &str;

    /// Generate a text response, optionally looking at images.
    async fn generate(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Requested output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParams {
    pub width: u32,
    pub height: u32,
}

/// A finished image.
#[derive(Debug, Clone)]
pub struct ImageOutput {
    pub bytes: Vec<u8>,

    /// Where the provider published the image.
    pub source_url: String,
}

/// Trait for text-to-image providers (e.g., Flux).
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Model identifier, used in logs and metrics.
    fn model(&self) -> &str;

    /// Generate an image and return its bytes once ready.
    async fn generate(
        &self,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<ImageOutput, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn provider_errors_map_to_http_statuses() {
        let status = |e: ProviderError| AppError::from(e).into_response().status();

        assert_eq!(status(ProviderError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status(ProviderError::Timeout("poll".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(ProviderError::NotConfigured("key".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(ProviderError::ContentFiltered), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status(ProviderError::ApiError("500".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn attachment_sniffs_common_formats() {
        let png = ImageAttachment::from_bytes(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a]);
        let webp = ImageAttachment::from_bytes(b"RIFF\0\0\0\0WEBPVP8 ".to_vec());
        let jpeg = ImageAttachment::from_bytes(vec![0xff, 0xd8, 0xff]);

        assert_eq!(png.mime_type, "image/png");
        assert_eq!(webp.mime_type, "image/webp");
        assert_eq!(jpeg.mime_type, "image/jpeg");
    }
}
