//! Storage seam for generated images.

use crate::models::{GeneratedImage, GeneratedQuestionDocument};
use async_trait::async_trait;
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Append an image to the user's list, creating the document on first write.
    async fn append_image(
        &self,
        uid: &str,
        prompt: &str,
        bytes: Vec<u8>,
    ) -> Result<GeneratedImage, AppError>;

    async fn find(&self, uid: &str) -> Result<Option<GeneratedQuestionDocument>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Process-local store, for tests and running without MongoDB.
#[derive(Default)]
pub struct InMemoryImageStore {
    documents: RwLock<HashMap<String, GeneratedQuestionDocument>>,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document as-is.
    pub async fn insert(&self, document: GeneratedQuestionDocument) {
        self.documents
            .write()
            .await
            .insert(document.uid.clone(), document);
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn append_image(
        &self,
        uid: &str,
        prompt: &str,
        bytes: Vec<u8>,
    ) -> Result<GeneratedImage, AppError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .entry(uid.to_string())
            .or_insert_with(|| GeneratedQuestionDocument::new(uid));

        Ok(document.push_image(prompt, bytes).clone())
    }

    async fn find(&self, uid: &str) -> Result<Option<GeneratedQuestionDocument>, AppError> {
        Ok(self.documents.read().await.get(uid).cloned())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_append_creates_document() {
        let store = InMemoryImageStore::new();
        assert!(store.find("kid-1").await.unwrap().is_none());

        let image = store.append_image("kid-1", "Count the ducks", vec![1]).await.unwrap();
        assert_eq!(image.index, 1);

        let doc = store.find("kid-1").await.unwrap().unwrap();
        assert_eq!(doc.generated_images.len(), 1);
    }

    #[tokio::test]
    async fn appends_keep_order_per_user() {
        let store = InMemoryImageStore::new();
        store.append_image("kid-1", "first", vec![1]).await.unwrap();
        store.append_image("kid-2", "other", vec![9]).await.unwrap();
        store.append_image("kid-1", "second", vec![2]).await.unwrap();

        let doc = store.find("kid-1").await.unwrap().unwrap();
        let prompts: Vec<_> = doc.generated_images.iter().map(|i| i.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["first", "second"]);
        assert_eq!(doc.latest().unwrap().image_bytes(), Some(&[2u8][..]));
    }
}
