//! Database operations for the counting service.
//!
//! One document per user in the generated-questions collection, holding the
//! full list of images generated for them.

use crate::config::MongoConfig;
use crate::models::{GeneratedImage, GeneratedQuestionDocument};
use crate::services::store::ImageStore;
use async_trait::async_trait;
use mongodb::{
    bson::{self, doc},
    options::{ClientOptions, IndexOptions, UpdateOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use std::time::Duration;

#[derive(Clone)]
pub struct CountingDb {
    client: MongoClient,
    db: Database,
    collection: String,
}

impl CountingDb {
    pub async fn connect(config: &MongoConfig) -> Result<Self, AppError> {
        Self::connect_with_timeout(config, None).await
    }

    /// Connect, failing server selection after `timeout` instead of the driver default.
    pub async fn connect_with_timeout(
        config: &MongoConfig,
        timeout: Option<Duration>,
    ) -> Result<Self, AppError> {
        tracing::info!(database = %config.database, "Connecting to MongoDB");

        let mut options = ClientOptions::parse(&config.uri).await.map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        options.app_name = Some("counting-service".to_string());
        if timeout.is_some() {
            options.server_selection_timeout = timeout;
        }

        let client = MongoClient::with_options(options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(&config.database);

        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "MongoDB client ready"
        );

        Ok(Self {
            client,
            db,
            collection: config.collection.clone(),
        })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for counting-service");

        let uid_index = IndexModel::builder()
            .keys(doc! { "uid": 1 })
            .options(
                IndexOptions::builder()
                    .name("uid_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.generated_questions()
            .create_index(uid_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create uid index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn generated_questions(&self) -> Collection<GeneratedQuestionDocument> {
        self.db.collection(&self.collection)
    }

    pub async fn find_by_uid(
        &self,
        uid: &str,
    ) -> Result<Option<GeneratedQuestionDocument>, AppError> {
        self.generated_questions()
            .find_one(doc! { "uid": uid }, None)
            .await
            .map_err(|e| {
                tracing::error!(uid = %uid, "Failed to find generated questions: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })
    }

    /// Read the user's list, append, and write the whole list back.
    ///
    /// Concurrent appends for the same uid race; the last write wins.
    pub async fn append_generated_image(
        &self,
        uid: &str,
        prompt: &str,
        bytes: Vec<u8>,
    ) -> Result<GeneratedImage, AppError> {
        let mut document = self
            .find_by_uid(uid)
            .await?
            .unwrap_or_else(|| GeneratedQuestionDocument::new(uid));

        let image = document.push_image(prompt, bytes).clone();

        let images = bson::to_bson(&document.generated_images).map_err(|e| {
            tracing::error!("Failed to serialize generated images: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;

        self.generated_questions()
            .update_one(
                doc! { "uid": uid },
                doc! { "$set": { "generated_images": images } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(|e| {
                tracing::error!(uid = %uid, "Failed to save generated images: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!(
            uid = %uid,
            index = image.index,
            total = document.generated_images.len(),
            "Stored generated image"
        );

        Ok(image)
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }
}

#[async_trait]
impl ImageStore for CountingDb {
    async fn append_image(
        &self,
        uid: &str,
        prompt: &str,
        bytes: Vec<u8>,
    ) -> Result<GeneratedImage, AppError> {
        self.append_generated_image(uid, prompt, bytes).await
    }

    async fn find(&self, uid: &str) -> Result<Option<GeneratedQuestionDocument>, AppError> {
        self.find_by_uid(uid).await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.ping().await
    }
}
