//! Metrics collection and Prometheus export.
//!
//! HTTP metrics come from `service_core::middleware::metrics`; this module adds
//! the provider and pipeline series and renders everything for `/metrics`.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder. Later calls are no-ops.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
            tracing::info!("Prometheus metrics initialized");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Latency of one call to an AI provider.
pub fn record_provider_call(provider: &'static str, model: &str, elapsed: Duration) {
    histogram!(
        "counting_provider_latency_seconds",
        "provider" => provider,
        "model" => model.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_provider_error(provider: &'static str, error_type: &'static str) {
    counter!(
        "counting_provider_errors_total",
        "provider" => provider,
        "error_type" => error_type
    )
    .increment(1);
}

/// Number of result polls a Flux task needed.
pub fn record_poll_attempts(model: &str, attempts: u32) {
    histogram!("counting_image_poll_attempts", "model" => model.to_string())
        .record(f64::from(attempts));
}

pub fn record_image_stored() {
    counter!("counting_images_stored_total").increment(1);
}
