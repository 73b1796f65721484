//! Query cleanup shared by the search adapter and the researcher.

/// Punctuation that breaks arXiv's query syntax when left in a search term.
const SEARCH_BREAKERS: &[char] = &['?', '!', '。', '？', '！'];

/// Structural characters models leave around question text.
const STRUCTURAL: &[char] = &[
    '{', '}', '[', ']', '(', ')', '"', '\'', '`', ':', ';', '“', '”', '‘', '’', '「', '」', '『', '』',
];

pub const MAX_QUERY_WORDS: usize = 5;
pub const MAX_QUESTION_CHARS: usize = 100;

/// Prepares a search term: drops breaking punctuation and keeps at most
/// [`MAX_QUERY_WORDS`] words.
pub fn clean_search_query(query: &str) -> String {
    let stripped: String = query.chars().filter(|c| !SEARCH_BREAKERS.contains(c)).collect();
    stripped
        .split_whitespace()
        .take(MAX_QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns a sub-question into search text: strips quotes and structural
/// punctuation, collapses whitespace and caps the length at
/// [`MAX_QUESTION_CHARS`] characters. Idempotent.
pub fn sanitize_question(question: &str) -> String {
    let stripped: String = question
        .chars()
        .map(|c| if STRUCTURAL.contains(&c) { ' ' } else { c })
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_QUESTION_CHARS) {
        Some((idx, _)) => collapsed[..idx].trim_end().to_string(),
        None => collapsed,
    }
}
