use serde::Deserialize;

use crate::llm::{is_failure_marker, LlmResponse, ResilientClient};

use super::parse::decode_json;

const MAX_TOKENS: u32 = 100;
/// Upper bound on tool decisions in one delegated run.
pub const MAX_STEPS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    RefineTopic,
    ResearchQuestions,
    SummarizeReport,
}

impl Tool {
    pub const ORDER: [Tool; 3] = [Tool::RefineTopic, Tool::ResearchQuestions, Tool::SummarizeReport];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::RefineTopic => "refine_topic",
            Tool::ResearchQuestions => "research_questions",
            Tool::SummarizeReport => "summarize_report",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        let name = name.trim().to_lowercase();
        Tool::ORDER.into_iter().find(|t| t.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            Tool::RefineTopic => "split the topic into 3-5 researchable sub-questions",
            Tool::ResearchQuestions => "search arXiv and analyse each sub-question",
            Tool::SummarizeReport => "write the final report from the research results",
        }
    }

    fn requires(&self) -> Option<Tool> {
        match self {
            Tool::RefineTopic => None,
            Tool::ResearchQuestions => Some(Tool::RefineTopic),
            Tool::SummarizeReport => Some(Tool::ResearchQuestions),
        }
    }

    /// Not yet run, and whatever it depends on has run.
    pub fn is_runnable(&self, done: &[Tool]) -> bool {
        !done.contains(self) && self.requires().map_or(true, |r| done.contains(&r))
    }
}

/// First tool in fixed order that has not run yet.
pub fn next_in_order(done: &[Tool]) -> Option<Tool> {
    Tool::ORDER.into_iter().find(|t| !done.contains(t))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolChoice {
    pub tool: Tool,
    /// The model's pick was unusable and fixed order decided instead.
    pub fallback: bool,
}

#[derive(Deserialize)]
struct DecisionOutput {
    #[serde(alias = "action", alias = "name")]
    tool: String,
}

/// Asks the model which tool to run next.
pub struct Delegator {
    llm: ResilientClient,
    system_prompt: String,
}

impl Delegator {
    pub fn new(llm: ResilientClient, system_prompt: String) -> Self {
        Self { llm, system_prompt }
    }

    /// `None` once every tool has run.
    pub async fn choose(&self, topic: &str, done: &[Tool]) -> Option<(ToolChoice, LlmResponse)> {
        next_in_order(done)?;
        let response = self
            .llm
            .complete(&decision_prompt(topic, done), &self.system_prompt, 0.0, MAX_TOKENS)
            .await;
        let choice = resolve_choice(&response.text, done)?;
        Some((choice, response))
    }
}

fn decision_prompt(topic: &str, done: &[Tool]) -> String {
    let tools = Tool::ORDER
        .iter()
        .map(|t| format!("- {}: {}", t.name(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");
    let completed = if done.is_empty() {
        "none".to_string()
    } else {
        done.iter().map(Tool::name).collect::<Vec<_>>().join(", ")
    };

    format!(
        r#"You are coordinating a research run on the topic "{topic}".

Available tools:
{tools}

Already completed: {completed}

Choose the next tool to run. Respond with ONLY a JSON object:
{{"tool": "tool_name"}}"#
    )
}

/// Validates the model's pick against what can run now, falling back to
/// fixed order. `None` once every tool has run.
pub fn resolve_choice(text: &str, done: &[Tool]) -> Option<ToolChoice> {
    let next = next_in_order(done)?;

    let picked = if is_failure_marker(text) {
        None
    } else {
        decode_json(text)
            .and_then(|value| serde_json::from_value::<DecisionOutput>(value).ok())
            .and_then(|output| Tool::from_name(&output.tool))
    };

    match picked {
        Some(tool) if tool.is_runnable(done) => Some(ToolChoice {
            tool,
            fallback: false,
        }),
        other => {
            tracing::debug!(picked = ?other, fallback = next.name(), "tool choice rejected");
            Some(ToolChoice {
                tool: next,
                fallback: true,
            })
        }
    }
}
