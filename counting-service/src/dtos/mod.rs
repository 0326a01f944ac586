pub mod counting;

pub use counting::{FluxImageResponse, PromptResponse, QuestionPayload, UidRequest};
