use crate::llm::{is_failure_marker, ResilientClient, Usage};
use crate::model::SubQuestion;

use super::parse::{extract_question_lines, parse_question_json, DraftQuestion};

const MAX_TOKENS: u32 = 800;

/// How the question list was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionSource {
    Structured,
    Lines,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Refinement {
    pub questions: Vec<SubQuestion>,
    pub raw_output: String,
    pub source: QuestionSource,
    pub usage: Usage,
}

pub struct Refiner {
    llm: ResilientClient,
    system_prompt: String,
    temperature: f32,
}

impl Refiner {
    pub fn new(llm: ResilientClient, system_prompt: String, temperature: f32) -> Self {
        Self {
            llm,
            system_prompt,
            temperature,
        }
    }

    /// Decomposes `topic` into 1-5 sub-questions. Never fails: unusable model
    /// output degrades to line extraction, then to template questions.
    pub async fn refine(&self, topic: &str) -> Refinement {
        let response = self
            .llm
            .complete(
                &build_prompt(topic),
                &self.system_prompt,
                self.temperature,
                MAX_TOKENS,
            )
            .await;

        let mut usage = Usage::default();
        usage.record(&response);

        let (drafts, source) = interpret(&response.text, topic);
        tracing::info!(count = drafts.len(), ?source, "refined topic");

        Refinement {
            questions: SubQuestion::numbered(drafts),
            raw_output: response.text,
            source,
            usage,
        }
    }
}

fn build_prompt(topic: &str) -> String {
    format!(
        r#"You are a senior research assistant. For the topic "{topic}", write 3 to 5 concrete, researchable sub-questions, each with a short clarifier explaining its scope.

Respond with ONLY a JSON array, no other text:
[
  {{"question": "first sub-question", "clarifier": "what it covers"}},
  {{"question": "second sub-question", "clarifier": "what it covers"}}
]

Write the questions in the same language as the topic."#
    )
}

/// Applies the parse precedence: JSON, then question lines, then templates.
pub fn interpret(raw: &str, topic: &str) -> (Vec<DraftQuestion>, QuestionSource) {
    if !is_failure_marker(raw) {
        if let Some(drafts) = parse_question_json(raw) {
            return (drafts, QuestionSource::Structured);
        }
        let drafts = extract_question_lines(raw, topic);
        if !drafts.is_empty() {
            return (drafts, QuestionSource::Lines);
        }
    }
    tracing::warn!("refiner output unusable, using template questions");
    (fallback_questions(topic), QuestionSource::Fallback)
}

/// Three deterministic questions: principles, recent trends, applications.
pub fn fallback_questions(topic: &str) -> Vec<DraftQuestion> {
    let topic = topic.trim();
    vec![
        (
            format!("What are the basic principles of {}?", topic),
            format!("Core concepts behind {}", topic),
        ),
        (
            format!("What are the latest trends in {}?", topic),
            format!("Current state and recent developments of {}", topic),
        ),
        (
            format!("What are the application areas of {}?", topic),
            format!("Practical uses of {}", topic),
        ),
    ]
}
