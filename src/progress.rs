use std::time::Duration;

use crate::llm::FailureKind;

/// Notices surfaced to whatever is presenting the run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStarted {
        stage: &'static str,
    },
    StageFinished {
        stage: &'static str,
        latency_ms: u64,
    },
    RetryScheduled {
        kind: FailureKind,
        attempt: u32,
        max_attempts: u32,
        wait: Duration,
    },
    CallFailed {
        kind: FailureKind,
        detail: String,
    },
    SearchFailed {
        query: String,
        detail: String,
    },
    QuestionSkipped {
        id: String,
        reason: String,
    },
    QuestionResearched {
        id: String,
        papers: usize,
    },
    ToolSelected {
        step: u32,
        tool: &'static str,
        fallback: bool,
    },
}

pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: &ProgressEvent);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn notify(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => tracing::info!(stage, "stage started"),
            ProgressEvent::StageFinished { stage, latency_ms } => {
                tracing::info!(stage, latency_ms, "stage finished")
            }
            ProgressEvent::RetryScheduled {
                kind,
                attempt,
                max_attempts,
                wait,
            } => tracing::warn!(
                ?kind,
                attempt,
                max_attempts,
                wait_secs = wait.as_secs_f64(),
                "llm call failed, retrying"
            ),
            ProgressEvent::CallFailed { kind, detail } => {
                tracing::warn!(?kind, %detail, "llm call gave up")
            }
            ProgressEvent::SearchFailed { query, detail } => {
                tracing::warn!(%query, %detail, "paper search failed")
            }
            ProgressEvent::QuestionSkipped { id, reason } => {
                tracing::warn!(%id, %reason, "sub-question skipped")
            }
            ProgressEvent::QuestionResearched { id, papers } => {
                tracing::debug!(%id, papers, "sub-question researched")
            }
            ProgressEvent::ToolSelected {
                step,
                tool,
                fallback,
            } => tracing::info!(step, tool, fallback, "tool selected"),
        }
    }
}

/// Human-readable stderr output for `--verbose`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn notify(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => eprintln!("[{}] started", stage),
            ProgressEvent::StageFinished { stage, latency_ms } => {
                eprintln!("[{}] finished in {}ms", stage, latency_ms)
            }
            ProgressEvent::RetryScheduled {
                kind,
                attempt,
                max_attempts,
                wait,
            } => eprintln!(
                "  {} (attempt {}/{}), retrying in {}s",
                kind.describe(),
                attempt,
                max_attempts,
                wait.as_secs()
            ),
            ProgressEvent::CallFailed { kind, detail } => {
                eprintln!("  LLM call failed ({}): {}", kind.describe(), detail)
            }
            ProgressEvent::SearchFailed { query, detail } => {
                eprintln!("  search for {:?} failed: {}", query, detail)
            }
            ProgressEvent::QuestionSkipped { id, reason } => {
                eprintln!("  skipping {}: {}", id, reason)
            }
            ProgressEvent::QuestionResearched { id, papers } => {
                eprintln!("  {} researched with {} papers", id, papers)
            }
            ProgressEvent::ToolSelected {
                step,
                tool,
                fallback,
            } => {
                if *fallback {
                    eprintln!("[step {}] {} (fallback order)", step, tool)
                } else {
                    eprintln!("[step {}] {}", step, tool)
                }
            }
        }
    }
}
