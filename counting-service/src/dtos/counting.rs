use crate::models::CountingPrompt;
use crate::services::GeneratedQuestion;
use serde::{Deserialize, Serialize};

/// Body of the per-user routes. A missing `uid` is rejected by the pipeline.
#[derive(Debug, Default, Deserialize)]
pub struct UidRequest {
    #[serde(default)]
    pub uid: Option<String>,
}

impl UidRequest {
    pub fn uid(&self) -> &str {
        self.uid.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptResponse {
    pub generated_text: String,
    pub object1: Option<String>,
    pub object2: Option<String>,
}

impl From<CountingPrompt> for PromptResponse {
    fn from(prompt: CountingPrompt) -> Self {
        Self {
            generated_text: prompt.generated_text,
            object1: prompt.object1,
            object2: prompt.object2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FluxImageResponse {
    pub result: String,
    pub object1: String,
    pub object2: String,
    pub question_string: String,
    pub image_url: String,
}

impl From<GeneratedQuestion> for FluxImageResponse {
    fn from(question: GeneratedQuestion) -> Self {
        Self {
            result: question.result,
            object1: question.object1,
            object2: question.object2,
            question_string: question.question_string,
            image_url: question.image_url,
        }
    }
}

/// Question shape the app renders for `count_1`; sent with placeholder values.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionPayload {
    pub question_image: String,
    pub question_string: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}
