pub mod counting;
pub mod health;

pub use counting::{count_1, flux_image, get_image, prompt_generation};
pub use health::{health_check, metrics_endpoint, readiness_check};
