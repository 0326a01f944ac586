//! Stored images, one document per user.

use mongodb::bson::{spec::BinarySubtype, Binary};
use serde::{Deserialize, Serialize};

/// All images generated for one user, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestionDocument {
    pub uid: String,

    #[serde(default)]
    pub generated_images: Vec<GeneratedImage>,
}

impl GeneratedQuestionDocument {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            generated_images: Vec::new(),
        }
    }

    /// Append a new image, numbering it after the existing entries.
    pub fn push_image(&mut self, prompt: impl Into<String>, bytes: Vec<u8>) -> &GeneratedImage {
        let index = self.generated_images.len() as i32 + 1;
        self.generated_images
            .push(GeneratedImage::new(index, prompt, bytes));
        &self.generated_images[self.generated_images.len() - 1]
    }

    /// Most recently appended image.
    pub fn latest(&self) -> Option<&GeneratedImage> {
        self.generated_images.last()
    }
}

/// A single generated image and the sentence it was drawn for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// 1-based position in the user's list when appended.
    pub index: i32,

    pub prompt: String,

    /// Raw image bytes as returned by the image API.
    #[serde(default)]
    pub image: Option<Binary>,
}

impl GeneratedImage {
    pub fn new(index: i32, prompt: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            index,
            prompt: prompt.into(),
            image: Some(Binary {
                subtype: BinarySubtype::Generic,
                bytes,
            }),
        }
    }

    /// Image bytes, or `None` when the record holds no data.
    pub fn image_bytes(&self) -> Option<&[u8]> {
        self.image
            .as_ref()
            .map(|b| b.bytes.as_slice())
            .filter(|b| !b.is_empty())
    }
}
