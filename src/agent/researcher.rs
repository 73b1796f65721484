use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;

use crate::llm::{is_failure_marker, ResilientClient, Usage};
use crate::model::{Analysis, Confidence, DataQuality, PaperRecord, ResearchResult, SubQuestion};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::retrieval::query::sanitize_question;
use crate::retrieval::PaperSource;

use super::parse::parse_analysis_json;

const MAX_TOKENS: u32 = 700;
const MIN_QUERY_CHARS: usize = 5;
const FALLBACK_TITLE_CHARS: usize = 50;
pub const GENERAL_KNOWLEDGE: &str = "general knowledge";

/// Where each sub-question's search starts in the result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPolicy {
    /// `index * stride`
    Stride(usize),
    /// Uniform in `0..=max`.
    Jitter(usize),
}

impl OffsetPolicy {
    fn offset(&self, index: usize) -> usize {
        match *self {
            OffsetPolicy::Stride(stride) => index * stride,
            OffsetPolicy::Jitter(max) => rand::thread_rng().gen_range(0..=max),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResearchSettings {
    pub max_results: usize,
    pub papers_per_question: usize,
    pub offset: OffsetPolicy,
    pub system_prompt: String,
    pub temperature: f32,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_results: 5,
            papers_per_question: 3,
            offset: OffsetPolicy::Stride(5),
            system_prompt: "You are a helpful research assistant.".into(),
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Research {
    pub results: Vec<ResearchResult>,
    pub skipped: usize,
    pub papers_retrieved: usize,
    pub usage: Usage,
}

pub struct Researcher {
    llm: ResilientClient,
    source: Arc<dyn PaperSource>,
    sink: Arc<dyn ProgressSink>,
    settings: ResearchSettings,
}

impl Researcher {
    pub fn new(
        llm: ResilientClient,
        source: Arc<dyn PaperSource>,
        sink: Arc<dyn ProgressSink>,
        settings: ResearchSettings,
    ) -> Self {
        Self {
            llm,
            source,
            sink,
            settings,
        }
    }

    /// Researches each sub-question in order. A paper backs at most one
    /// sub-question per call.
    pub async fn research(&self, questions: &[SubQuestion]) -> Research {
        let mut research = Research::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (index, question) in questions.iter().enumerate() {
            let query = sanitize_question(&question.question);
            if query.chars().count() < MIN_QUERY_CHARS {
                self.sink.notify(&ProgressEvent::QuestionSkipped {
                    id: question.id.clone(),
                    reason: format!("sanitised question too short: {:?}", query),
                });
                research.skipped += 1;
                continue;
            }

            let papers = self.gather(&query, index, &mut seen).await;
            research.papers_retrieved += papers.len();

            let response = self
                .llm
                .complete(
                    &analysis_prompt(&question.question, &papers),
                    &self.settings.system_prompt,
                    self.settings.temperature,
                    MAX_TOKENS,
                )
                .await;
            research.usage.record(&response);

            let analysis = build_analysis(&response.text, papers);
            self.sink.notify(&ProgressEvent::QuestionResearched {
                id: question.id.clone(),
                papers: analysis.supporting_papers.len(),
            });

            research.results.push(ResearchResult {
                sub_question: question.clone(),
                analysis,
            });
        }

        research
    }

    /// Searches at the question's offset, retrying once from the top when
    /// nothing new comes back. Retained papers are marked as seen.
    async fn gather(&self, query: &str, index: usize, seen: &mut HashSet<String>) -> Vec<PaperRecord> {
        let start = self.settings.offset.offset(index);
        let hits = self.source.search(query, self.settings.max_results, start).await;
        let mut papers = self.unseen(hits, seen);

        if papers.is_empty() && start != 0 {
            tracing::debug!(%query, start, "no unseen papers, retrying at offset 0");
            let hits = self.source.search(query, self.settings.max_results, 0).await;
            papers = self.unseen(hits, seen);
        }

        for paper in &papers {
            seen.insert(paper.external_id.clone());
        }
        papers
    }

    fn unseen(&self, hits: Vec<PaperRecord>, seen: &HashSet<String>) -> Vec<PaperRecord> {
        let mut page: HashSet<String> = HashSet::new();
        hits.into_iter()
            .filter(|p| !p.external_id.is_empty())
            .filter(|p| !seen.contains(&p.external_id))
            .filter(|p| page.insert(p.external_id.clone()))
            .take(self.settings.papers_per_question)
            .collect()
    }
}

fn analysis_prompt(question: &str, papers: &[PaperRecord]) -> String {
    if papers.is_empty() {
        return format!(
            r#"You are a researcher. No arXiv papers were found for the sub-question "{question}".

Using general knowledge:
1) give 2-3 relevant findings
2) state the limits of the evidence
3) rate your confidence (low/medium/high)

Respond with ONLY a JSON object:
{{
  "findings": ["finding 1", "finding 2"],
  "sources": ["general knowledge"],
  "confidence": "low",
  "data_quality": "limited",
  "notes": "no relevant papers found; based on general knowledge"
}}"#
        );
    }

    let papers_json = serde_json::to_string_pretty(papers).unwrap_or_default();
    format!(
        r#"You are a researcher. For the sub-question "{question}" these arXiv papers were retrieved:

{papers_json}

Based on these papers:
1) extract 2-3 concrete findings grounded in the titles and abstracts
2) assess the credibility of the sources
3) rate your confidence (low/medium/high)
4) note any gaps in the evidence

Respond with ONLY a JSON object:
{{
  "findings": ["finding 1", "finding 2"],
  "sources": ["arXiv paper titles"],
  "confidence": "medium",
  "data_quality": "good or limited",
  "notes": "limitations or caveats"
}}"#
    )
}

/// Structured analysis from the model's reply, or a minimal one built from
/// the papers when the reply is unusable. Papers are attached either way.
pub fn build_analysis(raw: &str, papers: Vec<PaperRecord>) -> Analysis {
    let parsed = if is_failure_marker(raw) {
        None
    } else {
        parse_analysis_json(raw)
    };

    let mut analysis = match parsed {
        Some(json) => Analysis {
            findings: json.findings(),
            sources: json.sources(),
            confidence: json.confidence(),
            data_quality: json.data_quality(),
            notes: json.notes(),
            supporting_papers: Vec::new(),
            raw_model_output: None,
        },
        None => {
            tracing::warn!("analysis output was not valid JSON, using paper titles");
            fallback_analysis(raw, &papers)
        }
    };

    if papers.is_empty() {
        analysis.sources = vec![GENERAL_KNOWLEDGE.to_string()];
        analysis.confidence = Confidence::Low;
        analysis.data_quality = DataQuality::Limited;
    }
    analysis.supporting_papers = papers;
    analysis
}

fn fallback_analysis(raw: &str, papers: &[PaperRecord]) -> Analysis {
    let (findings, sources) = if papers.is_empty() {
        (
            vec!["No relevant papers found".to_string()],
            vec![GENERAL_KNOWLEDGE.to_string()],
        )
    } else {
        (
            papers
                .iter()
                .take(2)
                .map(|p| format!("arXiv paper: {}...", head(&p.title, FALLBACK_TITLE_CHARS)))
                .collect(),
            vec!["arXiv".to_string()],
        )
    };
    let with_papers = !papers.is_empty();

    Analysis {
        findings,
        sources,
        confidence: if with_papers { Confidence::Medium } else { Confidence::Low },
        data_quality: if with_papers { DataQuality::Good } else { DataQuality::Limited },
        notes: "model output could not be parsed; showing paper data".to_string(),
        supporting_papers: Vec::new(),
        raw_model_output: Some(raw.to_string()),
    }
}

fn head(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
