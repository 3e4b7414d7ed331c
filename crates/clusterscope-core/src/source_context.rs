//! Text context around justification spans.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::{Error, Result};

pub const DEFAULT_CONTEXT_OFFSET: i64 = 50;

#[derive(Debug, Clone, Deserialize)]
struct Document {
    content: String,
}

/// Document map `{doc_id: {"content": text}}`.
#[derive(Debug, Clone, Default)]
pub struct SourceContext {
    docs: HashMap<String, Vec<char>>,
}

impl SourceContext {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let docs: HashMap<String, Document> =
            serde_json::from_str(&text).map_err(|e| Error::json(path, e))?;
        Ok(Self::from_documents(
            docs.into_iter().map(|(id, doc)| (id, doc.content)),
        ))
    }

    pub fn from_documents(docs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            docs: docs
                .into_iter()
                .map(|(id, content)| (id, content.chars().collect()))
                .collect(),
        }
    }

    pub fn doc_exists(&self, doc_id: &str) -> bool {
        self.docs.contains_key(doc_id)
    }

    /// Span `[start, end]` (character offsets) widened by up to `offset`
    /// characters on each side without crossing a line break. A side cut by
    /// the offset is marked with `...`. Unknown documents give `""`.
    pub fn context(&self, doc_id: &str, start: i64, end: i64, offset: i64) -> String {
        match self.docs.get(doc_id) {
            Some(content) => context_with_offset(content, start, end, offset),
            None => String::new(),
        }
    }
}

fn context_with_offset(content: &[char], start: i64, end: i64, offset: i64) -> String {
    let len = content.len() as i64;
    let clamp = |i: i64| i.clamp(0, len) as usize;
    let widest_from = start.saturating_sub(offset);
    let widest_to = end.saturating_add(offset);

    let line_start = content[..clamp(start.saturating_add(1))]
        .iter()
        .rposition(|c| *c == '\n')
        .map_or(0, |i| i as i64 + 1);
    let from = 0.max(line_start).max(widest_from);

    let line_end = content[clamp(end)..]
        .iter()
        .position(|c| *c == '\n')
        .map(|i| clamp(end) as i64 + i as i64);
    let to = match line_end {
        Some(nl) => len.min(nl).min(widest_to),
        None => len.min(widest_to),
    };

    let (lo, hi) = (clamp(from), clamp(to));
    let slice: String = if lo < hi {
        content[lo..hi].iter().collect()
    } else {
        String::new()
    };
    let mut out = slice.trim().replace('\n', " ");
    if from == widest_from {
        out.insert_str(0, "...");
    }
    if to == widest_to {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(content: &str) -> SourceContext {
        SourceContext::from_documents([("d".to_string(), content.to_string())])
    }

    #[test]
    fn short_documents_are_returned_whole() {
        let c = ctx("Obama visited Paris.");
        assert_eq!(c.context("d", 0, 5, 50), "Obama visited Paris.");
        assert_eq!(c.context("missing", 0, 5, 50), "");
        assert!(c.doc_exists("d") && !c.doc_exists("missing"));
    }

    #[test]
    fn truncated_sides_get_ellipses() {
        let text = "a".repeat(30) + "TARGET" + &"b".repeat(30);
        let c = ctx(&text);
        // The end offset is inclusive, so the slice stops at end + offset.
        let out = c.context("d", 30, 35, 10);
        assert_eq!(out, format!("...{}TARGET{}...", "a".repeat(10), "b".repeat(9)));
    }

    #[test]
    fn context_stops_at_line_breaks() {
        let c = ctx("first line\nthe mention here\nlast line");
        // "mention" starts at char 15.
        let out = c.context("d", 15, 21, 50);
        assert_eq!(out, "the mention here");
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let c = ctx("Müller fährt nach Köln");
        assert_eq!(c.context("d", 18, 21, 3), "...ch Köln");
    }

    #[test]
    fn extreme_offsets_saturate() {
        let c = ctx("Obama visited Paris.");
        assert_eq!(c.context("d", 0, 5, i64::MAX), "Obama visited Paris.");
        assert_eq!(c.context("d", i64::MIN, i64::MAX, 10), "Obama visited Paris.");
        for (start, end, offset) in [
            (i64::MAX, i64::MAX, i64::MAX),
            (i64::MIN, i64::MIN, i64::MAX),
            (0, 5, i64::MIN),
            (i64::MAX, i64::MIN, i64::MIN),
        ] {
            let _ = c.context("d", start, end, offset);
        }
    }

    #[test]
    fn loads_document_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source_map.json");
        fs::write(&path, r#"{"doc1": {"content": "hello world"}}"#).unwrap();
        let c = SourceContext::load(&path).unwrap();
        assert_eq!(c.context("doc1", 6, 10, 50), "hello world");
    }
}
