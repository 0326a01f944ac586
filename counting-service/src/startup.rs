//! Application startup and lifecycle management.

use crate::config::{CorsConfig, CountingConfig};
use crate::handlers;
use crate::services::providers::flux::{FluxImageProvider, FluxProviderConfig};
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::{ImageParams, ImageProvider, TextProvider};
use crate::services::{CountingDb, CountingPipeline, ImageStore};
use axum::{
    body::Body,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CountingPipeline>,
    pub store: Arc<dyn ImageStore>,
}

impl AppState {
    pub fn new(pipeline: CountingPipeline) -> Self {
        let store = pipeline.store().clone();
        Self {
            pipeline: Arc::new(pipeline),
            store,
        }
    }
}

/// All routes with the HTTP layers applied.
pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/count_1", post(handlers::count_1))
        .route("/prompt_generation", post(handlers::prompt_generation))
        .route("/flux_image", post(handlers::flux_image))
        .route("/get_image", post(handlers::get_image))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(cors))
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allows_any_origin() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins = cors
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-request-id"),
        ])
}

/// Build the Gemini and Flux clients and the pipeline around `store`.
pub fn build_pipeline(
    config: &CountingConfig,
    store: Arc<dyn ImageStore>,
) -> Result<CountingPipeline, AppError> {
    let prompt_provider: Arc<dyn TextProvider> = Arc::new(GeminiTextProvider::new(GeminiConfig {
        api_key: config.google.api_key.clone(),
        model: config.google.prompt_model.clone(),
        api_base: config.google.api_base.clone(),
    })?);

    let vision_provider: Arc<dyn TextProvider> = Arc::new(GeminiTextProvider::new(GeminiConfig {
        api_key: config.google.api_key.clone(),
        model: config.google.vision_model.clone(),
        api_base: config.google.api_base.clone(),
    })?);

    tracing::info!(
        prompt_model = %config.google.prompt_model,
        vision_model = %config.google.vision_model,
        "Initialized Gemini text providers"
    );

    let image_provider: Arc<dyn ImageProvider> =
        Arc::new(FluxImageProvider::new(FluxProviderConfig {
            api_key: config.flux.api_key.clone(),
            api_base: config.flux.api_base.clone(),
            model: config.flux.model.clone(),
            poll_interval: config.flux.poll_interval(),
            max_poll_attempts: config.flux.max_poll_attempts,
        })?);

    tracing::info!(
        model = %config.flux.model,
        endpoint = %config.flux.api_base,
        "Initialized Flux image provider"
    );

    Ok(CountingPipeline::new(
        prompt_provider,
        vision_provider,
        image_provider,
        store,
        ImageParams {
            width: config.flux.width,
            height: config.flux.height,
        },
    ))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Connect to MongoDB, build the providers and bind the listener.
    pub async fn build(config: CountingConfig) -> Result<Self, AppError> {
        let db = CountingDb::connect(&config.mongodb).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            e
        })?;

        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let store: Arc<dyn ImageStore> = Arc::new(db);
        let pipeline = build_pipeline(&config, store)?;

        Self::with_state(&config, AppState::new(pipeline)).await
    }

    /// Bind the configured port (0 picks a free one) and serve `state`.
    pub async fn with_state(config: &CountingConfig, state: AppState) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Counting service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router: router(state, &config.cors),
        })
    }

    pub fn http_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
