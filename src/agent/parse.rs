//! Recovering structure from free-form model output.
//!
//! Two tiers, both pure: a strict JSON decode (after removing code fences and
//! surrounding prose), then a line grammar for question lists. Callers supply
//! the deterministic fallback when both come up empty.

use serde::Deserialize;
use serde_json::Value;

use crate::model::{Confidence, DataQuality};

pub const MAX_SUB_QUESTIONS: usize = 5;
pub const MIN_QUESTION_LINE_CHARS: usize = 10;

/// A question and its clarifier before ids are assigned.
pub type DraftQuestion = (String, String);

/// Strips a wrapping ```` ``` ```` / ```` ```json ```` fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) if rest[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[newline + 1..]
        }
        _ => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Outermost `open ... close` span, when both delimiters are present.
fn extract_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}

/// Decodes the first JSON value found in `text`: the whole (fence-stripped)
/// text, else the outermost array, else the outermost object.
pub fn decode_json(text: &str) -> Option<Value> {
    let clean = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(clean) {
        return Some(value);
    }
    [('[', ']'), ('{', '}')]
        .iter()
        .filter_map(|&(open, close)| extract_fragment(clean, open, close))
        .find_map(|fragment| serde_json::from_str::<Value>(fragment).ok())
}

/// Tier 1 for the refiner: a JSON list of questions in any of the shapes
/// models produce (`[{question, clarifier}]`, `["..."]`,
/// `{"sub_questions": [...]}`). Returns `None` if nothing usable decoded.
pub fn parse_question_json(text: &str) -> Option<Vec<DraftQuestion>> {
    let value = decode_json(text)?;
    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => ["sub_questions", "subquestions", "questions"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_else(|| std::slice::from_ref(&value)),
        _ => return None,
    };

    let drafts: Vec<DraftQuestion> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(q) => Some((q.trim().to_string(), String::new())),
            Value::Object(map) => {
                let question = ["question", "sub_question", "text"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))?;
                let clarifier = map
                    .get("clarifier")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some((question.trim().to_string(), clarifier.trim().to_string()))
            }
            _ => None,
        })
        .filter(|(q, _)| !q.is_empty())
        .take(MAX_SUB_QUESTIONS)
        .collect();

    (!drafts.is_empty()).then_some(drafts)
}

/// Tier 2 for the refiner: one question per line.
///
/// A line is kept when, after removing list markers and emphasis, it is at
/// least [`MIN_QUESTION_LINE_CHARS`] long and either reads as a question or
/// mentions the topic. `"question": "..."` lines from broken JSON are
/// decoded as string literals. At most [`MAX_SUB_QUESTIONS`] are returned.
pub fn extract_question_lines(text: &str, topic: &str) -> Vec<DraftQuestion> {
    let keywords = topic_keywords(topic);
    let mut drafts: Vec<DraftQuestion> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        let candidate = match quoted_field(line, "question") {
            Some(q) => q,
            None if is_structural(line) => continue,
            None => clean_line(line),
        };

        if candidate.chars().count() < MIN_QUESTION_LINE_CHARS {
            continue;
        }
        if !(is_interrogative(&candidate) || mentions_any(&candidate, &keywords)) {
            continue;
        }
        if drafts.iter().any(|(q, _)| *q == candidate) {
            continue;
        }
        drafts.push((candidate, String::new()));
        if drafts.len() == MAX_SUB_QUESTIONS {
            break;
        }
    }

    drafts
}

/// Value of `"key": "..."` on a single line, decoded as a JSON string.
fn quoted_field(line: &str, key: &str) -> Option<String> {
    let needle = format!("\"{}\"", key);
    let after_key = &line[line.find(&needle)? + needle.len()..];
    let value = after_key.trim_start().strip_prefix(':')?.trim();
    let value = value.trim_end_matches(|c: char| c == ',' || c == '}').trim_end();
    serde_json::from_str::<String>(value)
        .ok()
        .map(|q| q.trim().to_string())
}

/// JSON scaffolding, fences, key/value lines for other fields and preambles
/// that introduce a list ("Here are five sub-questions about X:").
fn is_structural(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("```")
        || line.chars().all(|c| "{}[],".contains(c) || c.is_whitespace())
        || (line.starts_with('"') && line.contains("\":"))
        || line.ends_with(':')
        || line.ends_with('：')
}

fn clean_line(line: &str) -> String {
    let mut rest = line.trim_start_matches(|c: char| "-*•#>".contains(c) || c.is_whitespace());

    // Numbered markers: "1.", "2)", "3、", "Q4:", "Q5."
    let without_q = rest
        .strip_prefix('Q')
        .or_else(|| rest.strip_prefix('q'))
        .filter(|r| r.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(rest);
    let digits = without_q.len() - without_q.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let after = &without_q[digits..];
        if let Some(stripped) = after.strip_prefix(['.', ')', ':', '、', '：']) {
            rest = stripped;
        }
    }

    rest.trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '\'' || c == ',' || c == '`')
        .trim()
        .to_string()
}

const INTERROGATIVES: &[&str] = &[
    "what", "how", "why", "which", "who", "when", "where", "does", "do", "can", "is", "are",
    "should", "will", "could",
];

const CJK_INTERROGATIVES: &[&str] = &[
    "什麼", "什么", "如何", "為何", "为何", "為什麼", "为什么", "哪些", "哪個", "哪个", "是否", "嗎", "吗",
];

fn is_interrogative(candidate: &str) -> bool {
    if candidate.contains('?') || candidate.contains('？') {
        return true;
    }
    if CJK_INTERROGATIVES.iter().any(|m| candidate.contains(m)) {
        return true;
    }
    let lower = candidate.to_lowercase();
    let first = lower.split_whitespace().next().unwrap_or_default();
    INTERROGATIVES.contains(&first) || lower.starts_with("to what")
}

/// Lowercased topic words of 4+ characters; the whole topic when it has no
/// spaces (e.g. CJK topics).
fn topic_keywords(topic: &str) -> Vec<String> {
    let lower = topic.trim().to_lowercase();
    let words: Vec<String> = lower
        .split_whitespace()
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_string)
        .collect();
    if words.is_empty() && !lower.is_empty() {
        vec![lower]
    } else {
        words
    }
}

fn mentions_any(candidate: &str, keywords: &[String]) -> bool {
    let lower = candidate.to_lowercase();
    keywords.iter().any(|k| lower.contains(k.as_str()))
}

/// Analysis object requested from the researcher's model call.
///
/// Every field is kept as raw JSON so a null, a number or a lone string where
/// a list was asked for degrades that field instead of the whole reply.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisJson {
    #[serde(default)]
    findings: Value,
    #[serde(default)]
    sources: Value,
    #[serde(default)]
    confidence: Value,
    #[serde(default, alias = "dataQuality")]
    data_quality: Value,
    #[serde(default)]
    notes: Value,
}

const ANALYSIS_KEYS: &[&str] = &[
    "findings",
    "sources",
    "confidence",
    "data_quality",
    "dataQuality",
    "notes",
];

impl AnalysisJson {
    pub fn findings(&self) -> Vec<String> {
        text_list(&self.findings)
    }

    pub fn sources(&self) -> Vec<String> {
        text_list(&self.sources)
    }

    /// Non-string labels map to `Unknown`.
    pub fn confidence(&self) -> Confidence {
        self.confidence
            .as_str()
            .map_or(Confidence::Unknown, Confidence::from_label)
    }

    pub fn data_quality(&self) -> DataQuality {
        self.data_quality
            .as_str()
            .map_or(DataQuality::Unknown, DataQuality::from_label)
    }

    pub fn notes(&self) -> String {
        value_text(&self.notes)
    }
}

/// Decode of an analysis object; `None` unless the reply holds a JSON object
/// with at least one analysis field.
pub fn parse_analysis_json(text: &str) -> Option<AnalysisJson> {
    let clean = strip_code_fences(text);
    let value = serde_json::from_str::<Value>(clean)
        .ok()
        .filter(Value::is_object)
        .or_else(|| serde_json::from_str::<Value>(extract_fragment(clean, '{', '}')?).ok())?;
    let map = value.as_object()?;
    if !ANALYSIS_KEYS.iter().any(|key| map.contains_key(*key)) {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// A list field as text items; a lone scalar or object becomes one item.
fn text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => flatten_texts(items),
        other => {
            let text = value_text(other);
            if text.is_empty() {
                Vec::new()
            } else {
                vec![text]
            }
        }
    }
}

fn flatten_texts(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(value_text)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Text content of a JSON value; objects contribute their string fields.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => flatten_texts(items).join("; "),
        Value::Object(map) => map
            .values()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" - "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```  "), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```[1]```"), "[1]");
        assert_eq!(strip_code_fences("```[\"A?\",\"B?\"]\n```"), "[\"A?\",\"B?\"]");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn question_json_accepts_object_list() {
        let raw = r#"[{"question": "What is QEC?", "clarifier": "basics"}, {"question": "Why now?"}]"#;
        let drafts = parse_question_json(raw).unwrap();
        assert_eq!(
            drafts,
            vec![
                ("What is QEC?".to_string(), "basics".to_string()),
                ("Why now?".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn question_json_accepts_wrapped_and_fenced_shapes() {
        let raw = "Sure! Here you go:\n```json\n{\"sub_questions\": [{\"question\": \"A?\"}, {\"question\": \"B?\"}]}\n```";
        assert_eq!(parse_question_json(raw).unwrap().len(), 2);

        let raw = r#"{"questions": ["One?", "Two?", "Three?"]}"#;
        assert_eq!(parse_question_json(raw).unwrap()[2].0, "Three?");
    }

    #[test]
    fn question_json_single_object_is_one_question() {
        let raw = r#"{"question": "Only one?", "clarifier": "c"}"#;
        assert_eq!(parse_question_json(raw).unwrap().len(), 1);
    }

    #[test]
    fn question_json_caps_at_five_and_drops_blanks() {
        let raw = r#"["1?", "", "2?", "3?", "4?", "5?", "6?"]"#;
        let drafts = parse_question_json(raw).unwrap();
        assert_eq!(drafts.len(), 5);
        assert!(drafts.iter().all(|(q, _)| !q.is_empty()));
    }

    #[test]
    fn question_json_rejects_non_lists() {
        assert!(parse_question_json("42").is_none());
        assert!(parse_question_json("[1, 2, 3]").is_none());
        assert!(parse_question_json("not json at all").is_none());
        assert!(parse_question_json(r#"{"answer": "no"}"#).is_none());
    }

    #[test]
    fn lines_from_truncated_json_are_recovered() {
        let raw = r#"[
  {
    "question": "How do surface codes reduce logical error rates?",
    "clarifier": "Focus on thresholds"
  },
  {
    "question": "What hardware limits quantum error correction today?",
    "clarif"#;
        let drafts = extract_question_lines(raw, "quantum error correction");
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].0, "How do surface codes reduce logical error rates?");
    }

    #[test]
    fn numbered_and_bulleted_lines_are_cleaned() {
        let raw = "Here are the sub-questions:\n1. What are the principles of RAG retrieval?\n2) **How is RAG evaluated?**\n- Q3: Which domains adopt retrieval augmentation?\n* short?\n";
        let drafts = extract_question_lines(raw, "RAG methods");
        let questions: Vec<&str> = drafts.iter().map(|(q, _)| q.as_str()).collect();
        assert_eq!(
            questions,
            vec![
                "What are the principles of RAG retrieval?",
                "How is RAG evaluated?",
                "Which domains adopt retrieval augmentation?",
            ]
        );
    }

    #[test]
    fn preamble_naming_the_topic_is_not_a_question() {
        let raw = "Here are five sub-questions about quantum error correction:\n1. How do surface codes lower logical error rates?\n2. Which decoders run in real time?";
        let drafts = extract_question_lines(raw, "quantum error correction");
        let questions: Vec<&str> = drafts.iter().map(|(q, _)| q.as_str()).collect();
        assert_eq!(
            questions,
            vec![
                "How do surface codes lower logical error rates?",
                "Which decoders run in real time?",
            ]
        );

        let raw = "以下是關於量子誤差修正的子問題：\n1. 量子誤差修正的基本原理是什麼？";
        let drafts = extract_question_lines(raw, "量子誤差修正");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].0, "量子誤差修正的基本原理是什麼？");
    }

    #[test]
    fn topic_mentions_count_without_question_marks() {
        let raw = "Survey of quantum error correction codes in superconducting qubits\nUnrelated filler sentence here";
        let drafts = extract_question_lines(raw, "quantum error correction");
        assert_eq!(drafts.len(), 1);
    }

    #[test]
    fn cjk_questions_are_recognised() {
        let raw = "1. 多語言 LLM 微調的基本方法有哪些\n2、如何評估多語言模型的表現？";
        let drafts = extract_question_lines(raw, "多語言LLM微調");
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].0, "如何評估多語言模型的表現？");
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(extract_question_lines("lorem ipsum\n###\n{}\n", "quantum error correction").is_empty());
        assert!(extract_question_lines("", "anything").is_empty());
    }

    #[test]
    fn line_extraction_caps_and_dedupes() {
        let raw = (0..8)
            .map(|i| format!("What is aspect number {}?", i))
            .chain(std::iter::once("What is aspect number 0?".to_string()))
            .collect::<Vec<_>>()
            .join("\n");
        let drafts = extract_question_lines(&raw, "x");
        assert_eq!(drafts.len(), 5);
    }

    #[test]
    fn analysis_json_decodes_with_lenient_fields() {
        let raw = r#"```json
{
  "findings": ["Finding one", {"finding": "Finding two", "paper": "P"}],
  "sources": ["arXiv:2401.01234"],
  "confidence": "High",
  "dataQuality": "limited",
  "notes": "few papers"
}
```"#;
        let parsed = parse_analysis_json(raw).unwrap();
        assert_eq!(parsed.findings().len(), 2);
        assert!(parsed.findings()[1].contains("Finding two"));
        assert_eq!(parsed.sources(), vec!["arXiv:2401.01234"]);
        assert_eq!(parsed.confidence(), Confidence::High);
        assert_eq!(parsed.data_quality(), DataQuality::Limited);
        assert_eq!(parsed.notes(), "few papers");
    }

    #[test]
    fn analysis_json_missing_fields_default_to_unknown() {
        let parsed = parse_analysis_json(r#"Result: {"findings": ["x"]} done"#).unwrap();
        assert_eq!(parsed.confidence(), Confidence::Unknown);
        assert_eq!(parsed.data_quality(), DataQuality::Unknown);
        assert_eq!(parsed.notes(), "");
    }

    #[test]
    fn analysis_json_rejects_prose() {
        assert!(parse_analysis_json("The papers suggest progress.").is_none());
        assert!(parse_analysis_json("[LLM call failed] rate limited").is_none());
        assert!(parse_analysis_json(r#"{"findings": "#).is_none());
    }

    #[test]
    fn analysis_json_tolerates_null_and_numeric_labels() {
        let raw = r#"{"findings": ["Surface codes scale"], "confidence": null, "data_quality": 3}"#;
        let parsed = parse_analysis_json(raw).unwrap();
        assert_eq!(parsed.findings(), vec!["Surface codes scale"]);
        assert_eq!(parsed.confidence(), Confidence::Unknown);
        assert_eq!(parsed.data_quality(), DataQuality::Unknown);

        let parsed = parse_analysis_json(r#"{"findings": ["x"], "confidence": 0.8}"#).unwrap();
        assert_eq!(parsed.confidence(), Confidence::Unknown);
    }

    #[test]
    fn analysis_json_single_string_lists_become_one_item() {
        let raw = r#"{"findings": "Decoders now run in real time", "sources": "arXiv:2401.00001", "confidence": "medium"}"#;
        let parsed = parse_analysis_json(raw).unwrap();
        assert_eq!(parsed.findings(), vec!["Decoders now run in real time"]);
        assert_eq!(parsed.sources(), vec!["arXiv:2401.00001"]);
        assert_eq!(parsed.confidence(), Confidence::Medium);

        let parsed = parse_analysis_json(r#"{"findings": null, "notes": "nothing usable"}"#).unwrap();
        assert!(parsed.findings().is_empty());
        assert_eq!(parsed.notes(), "nothing usable");
    }

    #[test]
    fn analysis_json_needs_an_analysis_field() {
        assert!(parse_analysis_json(r#"{"answer": "yes"}"#).is_none());
        assert!(parse_analysis_json(r#"["Finding one"]"#).is_none());
    }
}
