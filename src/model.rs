use serde::{Deserialize, Serialize};

/// One decomposed, researchable question derived from the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub clarifier: String,
}

impl SubQuestion {
    /// Assigns ids `Q1..Qn` in order, whatever path produced the drafts.
    pub fn numbered(drafts: Vec<(String, String)>) -> Vec<SubQuestion> {
        drafts
            .into_iter()
            .enumerate()
            .map(|(i, (question, clarifier))| SubQuestion {
                id: format!("Q{}", i + 1),
                question,
                clarifier,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub published: String,
    pub external_id: String,
    pub url: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Confidence {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl Confidence {
    /// Lenient mapping of whatever label the model produced.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.starts_with("high") {
            Confidence::High
        } else if label.starts_with("medium") || label.starts_with("moderate") {
            Confidence::Medium
        } else if label.starts_with("low") {
            Confidence::Low
        } else {
            Confidence::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::Unknown => "unknown",
        }
    }
}

impl From<String> for Confidence {
    fn from(label: String) -> Self {
        Confidence::from_label(&label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum DataQuality {
    Good,
    Limited,
    #[default]
    Unknown,
}

impl DataQuality {
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.starts_with("good") || label.starts_with("high") {
            DataQuality::Good
        } else if label.starts_with("limited") || label.starts_with("poor") || label.starts_with("low")
        {
            DataQuality::Limited
        } else {
            DataQuality::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataQuality::Good => "good",
            DataQuality::Limited => "limited",
            DataQuality::Unknown => "unknown",
        }
    }
}

impl From<String> for DataQuality {
    fn from(label: String) -> Self {
        DataQuality::from_label(&label)
    }
}

/// Structured findings for one sub-question.
///
/// Always present for every researched question: degraded runs carry
/// `Unknown`/`Limited` markers instead of missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub findings: Vec<String>,
    pub sources: Vec<String>,
    pub confidence: Confidence,
    pub data_quality: DataQuality,
    pub notes: String,
    pub supporting_papers: Vec<PaperRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_model_output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    #[serde(flatten)]
    pub sub_question: SubQuestion,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Refiner, Researcher and Summarizer in fixed order.
    #[default]
    Fixed,
    /// The model picks the next tool; invalid picks fall back to fixed order.
    Delegated,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Fixed => "fixed",
            Strategy::Delegated => "delegated",
        }
    }
}

/// Composite value returned by a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub topic: String,
    pub strategy: Strategy,
    pub questions: Vec<SubQuestion>,
    pub raw_refiner_output: String,
    pub research: Vec<ResearchResult>,
    pub report: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_labels_are_lenient() {
        assert_eq!(Confidence::from_label("High"), Confidence::High);
        assert_eq!(Confidence::from_label(" medium-high "), Confidence::Medium);
        assert_eq!(Confidence::from_label("moderate"), Confidence::Medium);
        assert_eq!(Confidence::from_label("LOW"), Confidence::Low);
        assert_eq!(Confidence::from_label("low|medium|high"), Confidence::Low);
        assert_eq!(Confidence::from_label("certain"), Confidence::Unknown);
        assert_eq!(Confidence::from_label(""), Confidence::Unknown);
    }

    #[test]
    fn data_quality_labels_are_lenient() {
        assert_eq!(DataQuality::from_label("good/limited"), DataQuality::Good);
        assert_eq!(DataQuality::from_label("Limited"), DataQuality::Limited);
        assert_eq!(DataQuality::from_label("poor"), DataQuality::Limited);
        assert_eq!(DataQuality::from_label("n/a"), DataQuality::Unknown);
    }

    #[test]
    fn enums_deserialize_from_arbitrary_strings() {
        let c: Confidence = serde_json::from_str("\"Very High\"").unwrap();
        assert_eq!(c, Confidence::Unknown);
        let c: Confidence = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(c, Confidence::High);
        assert_eq!(serde_json::to_string(&Confidence::Medium).unwrap(), "\"medium\"");
        assert_eq!(serde_json::to_string(&DataQuality::Limited).unwrap(), "\"limited\"");
    }

    #[test]
    fn numbered_assigns_sequential_ids() {
        let questions = SubQuestion::numbered(vec![
            ("What is A?".into(), String::new()),
            ("What is B?".into(), "b".into()),
        ]);
        assert_eq!(questions[0].id, "Q1");
        assert_eq!(questions[1].id, "Q2");
        assert_eq!(questions[1].clarifier, "b");
    }

    #[test]
    fn research_result_flattens_sub_question() {
        let result = ResearchResult {
            sub_question: SubQuestion {
                id: "Q1".into(),
                question: "What is A?".into(),
                clarifier: String::new(),
            },
            analysis: Analysis {
                findings: vec![],
                sources: vec![],
                confidence: Confidence::Unknown,
                data_quality: DataQuality::Unknown,
                notes: String::new(),
                supporting_papers: vec![],
                raw_model_output: None,
            },
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["id"], "Q1");
        assert_eq!(value["question"], "What is A?");
        assert!(value["analysis"].get("raw_model_output").is_none());
    }
}
