//! Domain models for the counting service.

pub mod generated;
pub mod question;

pub use generated::{GeneratedImage, GeneratedQuestionDocument};
pub use question::{CountingPrompt, QuestionKind, QuestionTemplate};
