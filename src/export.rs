//! Downloadable documents built from a finished run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::model::{PipelineOutput, ResearchResult, SubQuestion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub topic: String,
    pub questions: Vec<SubQuestion>,
    pub raw_refiner_output: String,
    pub research_results: Vec<ResearchResult>,
    pub report: String,
    pub generated_at: String,
}

impl ExportDocument {
    pub fn from_output(output: &PipelineOutput) -> Self {
        Self {
            topic: output.topic.clone(),
            questions: output.questions.clone(),
            raw_refiner_output: output.raw_refiner_output.clone(),
            research_results: output.research.clone(),
            report: output.report.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Pretty JSON; non-ASCII text is written as-is.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize export document")
    }

    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse export document")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write JSON export: {}", path.display()))
    }
}

/// The plain-text export is the report itself.
pub fn write_text(output: &PipelineOutput, path: &Path) -> Result<()> {
    fs::write(path, &output.report)
        .with_context(|| format!("Failed to write text export: {}", path.display()))
}
