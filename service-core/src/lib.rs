//! service-core: Shared infrastructure for the counting exercise services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use mongodb;
pub use tokio;
pub use tower;
pub use tower_http;
pub use tracing;
