//! Atom feed parsing for arXiv query responses.

use anyhow::{anyhow, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::model::PaperRecord;

pub const SUMMARY_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Debug, Default)]
struct EntryAccum {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    author_name: String,
}

impl EntryAccum {
    fn push_text(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Id => &mut self.id,
            Field::Title => &mut self.title,
            Field::Summary => &mut self.summary,
            Field::Published => &mut self.published,
            Field::AuthorName => &mut self.author_name,
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text);
    }

    fn finish_author(&mut self) {
        let name = normalize_whitespace(&self.author_name);
        if !name.is_empty() {
            self.authors.push(name);
        }
        self.author_name.clear();
    }

    fn into_record(self) -> Option<PaperRecord> {
        let id = self.id.trim();
        // arXiv reports query errors as a pseudo-entry.
        if id.is_empty() || id.contains("/api/errors") {
            return None;
        }
        let external_id = id.trim_end_matches('/').rsplit('/').next()?.to_string();
        if external_id.is_empty() {
            return None;
        }
        Some(PaperRecord {
            title: normalize_whitespace(&self.title),
            authors: self.authors,
            summary: truncate_summary(&self.summary),
            published: self.published.trim().to_string(),
            external_id,
            url: id.to_string(),
            categories: self.categories,
        })
    }
}

/// Parses an arXiv Atom response into paper records, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<EntryAccum> = None;
    let mut in_author = false;
    let mut current: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let Some(acc) = entry.as_mut() else {
                    if e.local_name().as_ref() == b"entry" {
                        entry = Some(EntryAccum::default());
                    }
                    continue;
                };
                current = None;
                match e.local_name().as_ref() {
                    b"author" => in_author = true,
                    b"name" if in_author => current = Some(Field::AuthorName),
                    b"id" if !in_author => current = Some(Field::Id),
                    b"title" => current = Some(Field::Title),
                    b"summary" => current = Some(Field::Summary),
                    b"published" => current = Some(Field::Published),
                    b"category" => push_category(acc, &e),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(acc) = entry.as_mut() {
                    if e.local_name().as_ref() == b"category" {
                        push_category(acc, &e);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(acc), Some(field)) = (entry.as_mut(), current) {
                    let text = t
                        .unescape()
                        .map_err(|e| anyhow!("invalid text in Atom feed: {}", e))?;
                    acc.push_text(field, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(acc), Some(field)) = (entry.as_mut(), current) {
                    acc.push_text(field, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                current = None;
                match e.local_name().as_ref() {
                    b"entry" => {
                        if let Some(record) = entry.take().and_then(EntryAccum::into_record) {
                            papers.push(record);
                        }
                        in_author = false;
                    }
                    b"author" => {
                        if let Some(acc) = entry.as_mut() {
                            acc.finish_author();
                        }
                        in_author = false;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) if entry.is_some() => {
                return Err(anyhow!("truncated Atom feed: unclosed entry"));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("malformed Atom feed: {}", e)),
            _ => {}
        }
    }

    Ok(papers)
}

fn push_category(acc: &mut EntryAccum, e: &BytesStart<'_>) {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() != b"term" {
            continue;
        }
        if let Ok(value) = attr.unescape_value() {
            let term = value.trim();
            if !term.is_empty() && !acc.categories.iter().any(|c| c == term) {
                acc.categories.push(term.to_string());
            }
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-normalised summary, cut at [`SUMMARY_MAX_CHARS`] with `...`.
pub fn truncate_summary(summary: &str) -> String {
    let normalized = normalize_whitespace(summary);
    match normalized.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &normalized[..idx]),
        None => normalized,
    }
}
