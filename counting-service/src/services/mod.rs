pub mod counting;
pub mod database;
pub mod metrics;
pub mod providers;
pub mod store;

pub use counting::{CountingPipeline, GeneratedQuestion};
pub use database::CountingDb;
pub use store::{ImageStore, InMemoryImageStore};
