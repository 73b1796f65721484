use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::llm::Usage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLog {
    pub stage: String,
    pub latency_ms: u64,
    pub llm_calls: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

impl StageLog {
    pub fn new(stage: &str, latency_ms: u64, usage: &Usage) -> Self {
        Self {
            stage: stage.to_string(),
            latency_ms,
            llm_calls: usage.calls,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost: usage.cost,
        }
    }
}

/// One tool decision of a delegated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLog {
    pub step: u32,
    pub tool: String,
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    pub timestamp: String,
    pub topic: String,
    pub strategy: String,
    pub stages: Vec<StageLog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<DecisionLog>,
    pub questions: u32,
    pub skipped_questions: u32,
    pub papers_retrieved: u32,
    pub total_latency_ms: u64,
    pub total_llm_input_tokens: u32,
    pub total_llm_output_tokens: u32,
    pub total_cost: f64,
    pub report_words: u32,
}

impl RunLog {
    /// Fresh log stamped with a new id and the current time.
    pub fn start(topic: &str, strategy: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            topic: topic.to_string(),
            strategy: strategy.to_string(),
            stages: Vec::new(),
            decisions: Vec::new(),
            questions: 0,
            skipped_questions: 0,
            papers_retrieved: 0,
            total_latency_ms: 0,
            total_llm_input_tokens: 0,
            total_llm_output_tokens: 0,
            total_cost: 0.0,
            report_words: 0,
        }
    }

    pub fn record_stage(&mut self, stage: StageLog) {
        self.total_llm_input_tokens += stage.input_tokens;
        self.total_llm_output_tokens += stage.output_tokens;
        self.total_cost += stage.cost;
        self.stages.push(stage);
    }

    pub fn total_tokens(&self) -> u32 {
        self.total_llm_input_tokens + self.total_llm_output_tokens
    }

    pub fn llm_calls(&self) -> u32 {
        self.stages.iter().map(|s| s.llm_calls).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "Questions: {} (skipped {}) | Papers: {} | LLM calls: {} | Total latency: {:.1}s | Tokens used by LLM: {} | Cost: ${:.4}",
            self.questions,
            self.skipped_questions,
            self.papers_retrieved,
            self.llm_calls(),
            self.total_latency_ms as f64 / 1000.0,
            self.total_tokens(),
            self.total_cost,
        )
    }
}

/// Appends run logs as JSON lines to `<dir>/runs.jsonl`.
pub struct RunLogger {
    dir: PathBuf,
}

impl RunLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create logs directory")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("runs.jsonl")
    }

    pub fn write(&self, run_log: &RunLog) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .context("Failed to open log file")?;

        let json = serde_json::to_string(run_log).context("Failed to serialize run log")?;
        writeln!(file, "{}", json).context("Failed to write log")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(calls: u32, input: u32, output: u32, cost: f64) -> Usage {
        Usage {
            calls,
            input_tokens: input,
            output_tokens: output,
            cost,
        }
    }

    #[test]
    fn stages_accumulate_totals() {
        let mut log = RunLog::start("quantum error correction", "fixed");
        log.record_stage(StageLog::new("refine", 120, &usage(1, 100, 50, 0.001)));
        log.record_stage(StageLog::new("research", 900, &usage(3, 600, 300, 0.004)));
        log.questions = 3;
        log.papers_retrieved = 7;
        log.total_latency_ms = 1500;

        assert_eq!(log.total_tokens(), 1050);
        assert_eq!(log.llm_calls(), 4);
        assert!((log.total_cost - 0.005).abs() < 1e-12);
        let summary = log.summary();
        assert!(summary.starts_with("Questions: 3 (skipped 0) | Papers: 7 | LLM calls: 4"));
        assert!(summary.contains("Total latency: 1.5s"));
    }

    #[test]
    fn writer_appends_one_line_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RunLogger::new(dir.path().join("nested")).unwrap();

        let first = RunLog::start("a", "fixed");
        let mut second = RunLog::start("b", "delegated");
        second.decisions.push(DecisionLog {
            step: 1,
            tool: "refine_topic".into(),
            fallback: false,
        });
        logger.write(&first).unwrap();
        logger.write(&second).unwrap();

        let contents = fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: RunLog = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.topic, "b");
        assert_eq!(parsed.decisions[0].tool, "refine_topic");
        assert_ne!(parsed.id, first.id);
        assert!(!lines[0].contains("decisions"));
    }
}
