pub mod delegate;
pub mod parse;
pub mod refiner;
pub mod researcher;
pub mod summarizer;

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::instrumentation::{DecisionLog, RunLog, RunLogger, StageLog};
use crate::llm::{ResilientClient, Usage};
use crate::model::{PipelineOutput, ResearchResult, Strategy, SubQuestion};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::retrieval::PaperSource;

use delegate::{next_in_order, Delegator, Tool, MAX_STEPS};
use refiner::Refiner;
use researcher::{ResearchSettings, Researcher};
use summarizer::Summarizer;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub strategy: Strategy,
    pub system_prompt: String,
    pub temperature: f32,
    pub research: ResearchSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let research = ResearchSettings::default();
        Self {
            strategy: Strategy::Fixed,
            system_prompt: research.system_prompt.clone(),
            temperature: research.temperature,
            research,
        }
    }
}

/// Result of one run together with its instrumentation record.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub output: PipelineOutput,
    pub log: RunLog,
}

#[derive(Default)]
struct RunState {
    questions: Vec<SubQuestion>,
    raw_refiner_output: String,
    research: Vec<ResearchResult>,
    report: String,
}

/// Topic Refiner, Researcher and Summarizer behind one entry point.
pub struct Pipeline {
    refiner: Refiner,
    researcher: Researcher,
    summarizer: Summarizer,
    delegator: Delegator,
    strategy: Strategy,
    sink: Arc<dyn ProgressSink>,
    logger: Option<RunLogger>,
}

impl Pipeline {
    pub fn new(
        llm: ResilientClient,
        source: Arc<dyn PaperSource>,
        sink: Arc<dyn ProgressSink>,
        settings: PipelineSettings,
    ) -> Self {
        let system = settings.system_prompt;
        Self {
            refiner: Refiner::new(llm.clone(), system.clone(), settings.temperature),
            researcher: Researcher::new(llm.clone(), source, sink.clone(), settings.research),
            summarizer: Summarizer::new(llm.clone(), system.clone()),
            delegator: Delegator::new(llm, system),
            strategy: settings.strategy,
            sink,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Runs the whole pipeline for `topic`.
    ///
    /// Degraded model or search output still yields a complete result; an
    /// empty topic or a run where every sub-question is skipped is an error.
    pub async fn run(&self, topic: &str) -> Result<PipelineRun> {
        let topic = topic.trim();
        if topic.is_empty() {
            bail!("Topic must not be empty");
        }

        let run_start = Instant::now();
        let mut log = RunLog::start(topic, self.strategy.as_str());
        let mut state = RunState::default();

        match self.strategy {
            Strategy::Fixed => {
                for tool in Tool::ORDER {
                    self.execute(tool, topic, &mut state, &mut log).await?;
                }
            }
            Strategy::Delegated => self.run_delegated(topic, &mut state, &mut log).await?,
        }

        log.questions = state.questions.len() as u32;
        log.report_words = state.report.split_whitespace().count() as u32;
        log.total_latency_ms = run_start.elapsed().as_millis() as u64;

        if let Some(logger) = &self.logger {
            logger.write(&log)?;
        }
        tracing::info!(run_id = %log.id, "{}", log.summary());

        Ok(PipelineRun {
            output: PipelineOutput {
                topic: topic.to_string(),
                strategy: self.strategy,
                questions: state.questions,
                raw_refiner_output: state.raw_refiner_output,
                research: state.research,
                report: state.report,
            },
            log,
        })
    }

    async fn run_delegated(&self, topic: &str, state: &mut RunState, log: &mut RunLog) -> Result<()> {
        let mut done: Vec<Tool> = Vec::new();
        let mut usage = Usage::default();
        let mut latency_ms = 0u64;

        for step in 1..=MAX_STEPS {
            let decide_start = Instant::now();
            let Some((choice, response)) = self.delegator.choose(topic, &done).await else {
                break;
            };
            latency_ms += decide_start.elapsed().as_millis() as u64;
            usage.record(&response);

            self.sink.notify(&ProgressEvent::ToolSelected {
                step,
                tool: choice.tool.name(),
                fallback: choice.fallback,
            });
            log.decisions.push(DecisionLog {
                step,
                tool: choice.tool.name().to_string(),
                fallback: choice.fallback,
            });

            self.execute(choice.tool, topic, state, log).await?;
            done.push(choice.tool);
        }

        // Step budget exhausted: finish in fixed order.
        while let Some(tool) = next_in_order(&done) {
            self.execute(tool, topic, state, log).await?;
            done.push(tool);
        }

        log.record_stage(StageLog::new("delegate", latency_ms, &usage));
        Ok(())
    }

    async fn execute(&self, tool: Tool, topic: &str, state: &mut RunState, log: &mut RunLog) -> Result<()> {
        let stage = match tool {
            Tool::RefineTopic => "refine",
            Tool::ResearchQuestions => "research",
            Tool::SummarizeReport => "summarize",
        };
        self.sink.notify(&ProgressEvent::StageStarted { stage });
        let start = Instant::now();

        let usage = match tool {
            Tool::RefineTopic => {
                let refinement = self.refiner.refine(topic).await;
                state.questions = refinement.questions;
                state.raw_refiner_output = refinement.raw_output;
                refinement.usage
            }
            Tool::ResearchQuestions => {
                let research = self.researcher.research(&state.questions).await;
                if research.results.is_empty() {
                    bail!(
                        "All {} sub-questions were skipped; nothing to research",
                        state.questions.len()
                    );
                }
                log.skipped_questions = research.skipped as u32;
                log.papers_retrieved = research.papers_retrieved as u32;
                state.research = research.results;
                research.usage
            }
            Tool::SummarizeReport => {
                let (report, response) = self.summarizer.summarize(topic, &state.research).await;
                state.report = report;
                let mut usage = Usage::default();
                usage.record(&response);
                usage
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        self.sink.notify(&ProgressEvent::StageFinished { stage, latency_ms });
        log.record_stage(StageLog::new(stage, latency_ms, &usage));
        Ok(())
    }
}
