use crate::llm::{LlmResponse, ResilientClient};
use crate::model::ResearchResult;

const TEMPERATURE: f32 = 0.15;
const MAX_TOKENS: u32 = 1000;

pub struct Summarizer {
    llm: ResilientClient,
    system_prompt: String,
}

impl Summarizer {
    pub fn new(llm: ResilientClient, system_prompt: String) -> Self {
        Self { llm, system_prompt }
    }

    /// Writes the final report. The model's text is not parsed.
    pub async fn summarize(&self, topic: &str, results: &[ResearchResult]) -> (String, LlmResponse) {
        let response = self
            .llm
            .complete(
                &report_prompt(topic, results),
                &self.system_prompt,
                TEMPERATURE,
                MAX_TOKENS,
            )
            .await;
        (response.text.clone(), response)
    }
}

fn report_prompt(topic: &str, results: &[ResearchResult]) -> String {
    let results_json = serde_json::to_string_pretty(results).unwrap_or_default();
    format!(
        r#"You are a science writer. Write a complete research report from the researcher's results below.

Topic: {topic}
Results (findings, sources, confidence, data_quality and notes per sub-question):
{results_json}

Structure:
- Abstract (3 lines)
- Introduction (1 paragraph)
- Key findings (integrate every sub-question)
- Limitations (1 paragraph)
- Recommended next steps (3 bullets)

At most 600 words."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Analysis, Confidence, DataQuality, SubQuestion};
    use crate::testing::{llm, paper, RecordingSink, ScriptedBackend};
    use std::sync::Arc;

    fn result() -> ResearchResult {
        ResearchResult {
            sub_question: SubQuestion {
                id: "Q1".into(),
                question: "How do surface codes work?".into(),
                clarifier: "mechanics".into(),
            },
            analysis: Analysis {
                findings: vec!["Thresholds near 1%".into()],
                sources: vec!["arXiv".into()],
                confidence: Confidence::Medium,
                data_quality: DataQuality::Good,
                notes: String::new(),
                supporting_papers: vec![paper("2401.00001v1", "Surface Codes")],
                raw_model_output: None,
            },
        }
    }

    #[tokio::test]
    async fn report_is_returned_verbatim() {
        let report = "## Abstract\nShort.\n\n```\nnot parsed\n```";
        let backend = Arc::new(ScriptedBackend::replies([report]));
        let summarizer = Summarizer::new(
            llm(backend.clone(), Arc::new(RecordingSink::default())),
            String::new(),
        );

        let (text, response) = summarizer.summarize("quantum error correction", &[result()]).await;

        assert_eq!(text, report);
        assert_eq!(response.output_tokens, 5);
        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("Topic: quantum error correction"));
        assert!(prompt.contains("Thresholds near 1%"));
        assert!(prompt.contains("2401.00001v1"));
        assert!(prompt.contains("At most 600 words"));
    }

    #[tokio::test]
    async fn failed_call_yields_marker_as_report() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(crate::llm::LlmError::Api {
            status: 401,
            message: "bad key".into(),
        })]));
        let summarizer = Summarizer::new(llm(backend, Arc::new(RecordingSink::default())), String::new());
        let (text, _) = summarizer.summarize("topic", &[]).await;
        assert!(crate::llm::is_failure_marker(&text));
    }

    #[tokio::test]
    async fn blank_report_is_reported_as_failure() {
        let backend = Arc::new(ScriptedBackend::replies(["\n\n"]));
        let summarizer = Summarizer::new(llm(backend, Arc::new(RecordingSink::default())), String::new());
        let (text, _) = summarizer.summarize("quantum error correction", &[result()]).await;
        assert_eq!(text, "[LLM call failed] empty response");
    }
}
