//! Question templates and parsing of the language model's answer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches `object1:"apples", object2:"table"` with optional comma and spacing.
static OBJECT_PAIR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"object1:\s*"([^"]+)"\s*,?\s*object2:\s*"([^"]+)""#)
        .expect("object pair pattern is valid")
});

/// Families of exercises the app offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Counting,
    Coloring,
    Calculation,
}

impl QuestionKind {
    /// Templates available for this kind. Only counting has any so far.
    pub fn templates(self) -> &'static [QuestionTemplate] {
        match self {
            QuestionKind::Counting => &[QuestionTemplate::Count1],
            QuestionKind::Coloring | QuestionKind::Calculation => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionTemplate {
    /// "Count the number of {object1} on/in the {object2}"
    Count1,
}

impl QuestionTemplate {
    pub fn kind(self) -> QuestionKind {
        match self {
            QuestionTemplate::Count1 => QuestionKind::Counting,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            QuestionTemplate::Count1 => "count_1",
        }
    }

    /// Instruction sent to the language model.
    pub fn instruction(self) -> &'static str {
        match self {
            QuestionTemplate::Count1 => {
                "Create a sentence like \"Count the number of {object1} on/in the {object2},\" \
                 focusing on objects recognizable and interesting to children aged 2-7, such as \
                 animals, toys, fruits, etc. Provide the response in this format \
                 object1:\"object name\", object2:\"object name\"."
            }
        }
    }
}

/// The sentence the language model wrote and the two objects it named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingPrompt {
    pub generated_text: String,
    pub object1: Option<String>,
    pub object2: Option<String>,
}

impl CountingPrompt {
    /// Parse raw model output. The sentence is the first line; objects come
    /// from the first `object1:"..", object2:".."` pair anywhere in the text.
    pub fn parse(raw: &str) -> Self {
        let generated_text = raw.split('\n').next().unwrap_or_default().to_string();

        let flattened = raw.replace('\n', " ");
        let (object1, object2) = match OBJECT_PAIR_REGEX.captures(&flattened) {
            Some(caps) => (
                caps.get(1).map(|m| m.as_str().to_string()),
                caps.get(2).map(|m| m.as_str().to_string()),
            ),
            None => (None, None),
        };

        Self {
            generated_text,
            object1,
            object2,
        }
    }

    /// Both objects, if the model named them.
    pub fn objects(&self) -> Option<(&str, &str)> {
        match (&self.object1, &self.object2) {
            (Some(a), Some(b)) => Some((a.as_str(), b.as_str())),
            _ => None,
        }
    }

    /// Prompt for the image model.
    pub fn image_prompt(object1: &str, object2: &str) -> String {
        format!(
            "Make an image with 5-15 of {} positioned on a {} in a kid-friendly style with bright colors and clear shapes.",
            object1, object2
        )
    }

    /// Question shown to the child and sent to the vision model.
    pub fn question_string(object1: &str, object2: &str) -> String {
        format!(
            "Count the {} in/on {} and give the response in the format number_of_object='number'",
            object1, object2
        )
    }
}
