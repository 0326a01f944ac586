//! Black Forest Labs (Flux) image provider.
//!
//! Generation is asynchronous on the provider side: a job is submitted, its
//! result endpoint is polled until the status turns `Ready`, then the image
//! is downloaded from the returned sample URL.

use super::{ImageOutput, ImageParams, ImageProvider, ProviderError};
use crate::services::metrics;
use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sample URLs reject requests without a browser-like agent.
const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Flux provider configuration.
#[derive(Debug, Clone)]
pub struct FluxProviderConfig {
    pub api_key: Secret<String>,
    /// e.g. `https://api.bfl.ml`
    pub api_base: String,
    /// e.g. `flux-pro-1.1`
    pub model: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

/// Flux text-to-image provider.
pub struct FluxImageProvider {
    config: FluxProviderConfig,
    client: Client,
}

impl FluxImageProvider {
    pub fn new(config: FluxProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }

    /// Submit a generation job and return its task.
    async fn submit(
        &self,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<SubmitResponse, ProviderError> {
        let url = format!("{}/v1/{}", self.base(), self.config.model);

        let response = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .header("x-key", self.config.api_key.expose_secret())
            .json(&SubmitRequest {
                prompt,
                width: params.width,
                height: params.height,
            })
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let response = check_status(response, "submit").await?;

        response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse Flux submit response: {}", e))
        })
    }

    /// Poll the task until it is ready and return the sample URL.
    async fn poll(&self, task: &SubmitResponse) -> Result<String, ProviderError> {
        // The key only ever goes to the configured base.
        let polling_url = format!("{}/v1/get_result", self.base());

        for attempt in 1..=self.config.max_poll_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            let response = self
                .client
                .get(&polling_url)
                .header("accept", "application/json")
                .header("x-key", self.config.api_key.expose_secret())
                .query(&[("id", task.id.as_str())])
                .send()
                .await
                .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

            let response = check_status(response, "get_result").await?;
            let result: ResultResponse = response.json().await.map_err(|e| {
                ProviderError::InvalidResponse(format!("Failed to parse Flux result: {}", e))
            })?;

            match result.status {
                TaskStatus::Ready => {
                    metrics::record_poll_attempts(&self.config.model, attempt);
                    return result.result.map(|r| r.sample).ok_or_else(|| {
                        ProviderError::InvalidResponse(
                            "Flux reported Ready without a sample URL".to_string(),
                        )
                    });
                }
                TaskStatus::RequestModerated | TaskStatus::ContentModerated => {
                    tracing::warn!(task_id = %task.id, status = ?result.status, "Flux task moderated");
                    return Err(ProviderError::ContentFiltered);
                }
                TaskStatus::Error | TaskStatus::TaskNotFound => {
                    return Err(ProviderError::ApiError(format!(
                        "Flux task {} failed with status {:?}",
                        task.id, result.status
                    )));
                }
                TaskStatus::Pending | TaskStatus::Unknown => {
                    tracing::debug!(task_id = %task.id, attempt, status = ?result.status, "Flux task not ready");
                }
            }
        }

        metrics::record_poll_attempts(&self.config.model, self.config.max_poll_attempts);
        Err(ProviderError::Timeout(format!(
            "Flux task {} not ready after {} polls",
            task.id, self.config.max_poll_attempts
        )))
    }

    /// Fetch the finished image.
    async fn download(&self, sample_url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(sample_url)
            .header("user-agent", DOWNLOAD_USER_AGENT)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let response = check_status(response, "download").await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

async fn check_status(response: Response, call: &str) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        return Err(ProviderError::RateLimited);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::ApiError(format!(
        "Flux {} error {}: {}",
        call, status, body
    )))
}

#[async_trait]
impl ImageProvider for FluxImageProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<ImageOutput, ProviderError> {
        let task = self.submit(prompt, params).await?;
        tracing::info!(task_id = %task.id, model = %self.config.model, "Flux task submitted");

        let sample_url = self.poll(&task).await?;
        tracing::info!(task_id = %task.id, image_url = %sample_url, "Flux image ready");

        let bytes = self.download(&sample_url).await?;

        Ok(ImageOutput {
            bytes,
            source_url: sample_url,
        })
    }
}

// ============================================================================
// Flux API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    status: TaskStatus,
    #[serde(default)]
    result: Option<TaskResult>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    sample: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum TaskStatus {
    Ready,
    Pending,
    #[serde(rename = "Request Moderated")]
    RequestModerated,
    #[serde(rename = "Content Moderated")]
    ContentModerated,
    Error,
    #[serde(rename = "Task not found")]
    TaskNotFound,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, max_poll_attempts: u32) -> FluxImageProvider {
        FluxImageProvider::new(FluxProviderConfig {
            api_key: Secret::new("flux-key".to_string()),
            api_base: server.uri(),
            model: "flux-pro-1.1".to_string(),
            poll_interval: Duration::from_millis(1),
            max_poll_attempts,
        })
        .unwrap()
    }

    const PARAMS: ImageParams = ImageParams {
        width: 1024,
        height: 768,
    };

    async fn mount_submit(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/flux-pro-1.1"))
            .and(header("x-key", "flux-key"))
            .and(body_json(json!({ "prompt": "ducks", "width": 1024, "height": 768 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "task-1" })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_status(server: &MockServer, status: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path("/v1/get_result"))
            .and(query_param("id", "task-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "task-1", "status": status })),
            )
            .up_to_n_times(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn polls_until_ready_then_downloads() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        mount_status(&server, "Pending", 2).await;

        let sample_url = format!("{}/samples/task-1.jpeg", server.uri());
        Mock::given(method("GET"))
            .and(path("/v1/get_result"))
            .and(query_param("id", "task-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "task-1",
                "status": "Ready",
                "result": { "sample": sample_url, "prompt": "ducks" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/samples/task-1.jpeg"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xd8, 0xff, 0xd9]))
            .mount(&server)
            .await;

        let output = provider(&server, 10).generate("ducks", &PARAMS).await.unwrap();

        assert_eq!(output.bytes, vec![0xff, 0xd8, 0xff, 0xd9]);
        assert_eq!(output.source_url, sample_url);

        let polls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/v1/get_result")
            .count();
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn moderated_task_is_content_filtered() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        mount_status(&server, "Content Moderated", 5).await;

        let err = provider(&server, 10).generate("ducks", &PARAMS).await.unwrap_err();
        assert!(matches!(err, ProviderError::ContentFiltered));
    }

    #[tokio::test]
    async fn failed_task_is_an_api_error() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        mount_status(&server, "Error", 5).await;

        let err = provider(&server, 10).generate("ducks", &PARAMS).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError(_)));
    }

    #[tokio::test]
    async fn gives_up_after_max_polls() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        mount_status(&server, "Pending", 100).await;

        let err = provider(&server, 3).generate("ducks", &PARAMS).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn unknown_status_keeps_polling() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        mount_status(&server, "Queued", 100).await;

        let err = provider(&server, 2).generate("ducks", &PARAMS).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn rate_limited_submit_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server, 3).generate("ducks", &PARAMS).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn failed_download_is_an_api_error() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/get_result"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "task-1",
                "status": "Ready",
                "result": { "sample": format!("{}/samples/missing.jpeg", server.uri()) }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/samples/missing.jpeg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = provider(&server, 3).generate("ducks", &PARAMS).await.unwrap_err();
        match err {
            ProviderError::ApiError(msg) => assert!(msg.contains("404")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    async fn mount_ready(server: &MockServer, sample_url: &str) {
        Mock::given(method("GET"))
            .and(path("/v1/get_result"))
            .and(query_param("id", "task-1"))
            .and(header("x-key", "flux-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "task-1",
                "status": "Ready",
                "result": { "sample": sample_url }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn rate_limited_download_is_reported() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        mount_ready(&server, &format!("{}/samples/busy.jpeg", server.uri())).await;
        Mock::given(method("GET"))
            .and(path("/samples/busy.jpeg"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server, 3).generate("ducks", &PARAMS).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn polls_configured_base_even_when_submit_names_another_host() {
        let server = MockServer::start().await;
        let elsewhere = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/flux-pro-1.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "task-1",
                "polling_url": format!("{}/v1/get_result?id=task-1", elsewhere.uri())
            })))
            .mount(&server)
            .await;
        mount_ready(&server, &format!("{}/samples/task-1.jpeg", server.uri())).await;
        Mock::given(method("GET"))
            .and(path("/samples/task-1.jpeg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xd8]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Pending" })))
            .mount(&elsewhere)
            .await;

        provider(&server, 3).generate("ducks", &PARAMS).await.unwrap();

        assert!(elsewhere.received_requests().await.unwrap().is_empty());
        let polls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/v1/get_result")
            .count();
        assert_eq!(polls, 1);
    }
}
