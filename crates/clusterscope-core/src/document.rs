//! Approximate document text rebuilt from justification offsets.
//!
//! When the source text is not available locally, the mentions justified
//! in a document are laid out at their offsets, with the gaps between them
//! filled by spaces. Pronominal mentions are marked so they stand out.

use serde::{Deserialize, Serialize};

/// Justification kind that marks a pronoun.
pub const PRONOMINAL_MENTION: &str = "pronominal_mention";

/// One justified mention; `end` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JustifiedMention {
    pub label: String,
    pub start: i64,
    pub end: i64,
    pub pronominal: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Markup {
    /// Pronouns in `[brackets]`, other mentions as is.
    #[default]
    Plain,
    /// Pronouns in red bold, other mentions underlined.
    Html,
}

#[derive(Debug, Deserialize)]
struct PrivateData {
    #[serde(default, rename = "justificationType")]
    justification_type: Option<String>,
}

/// Whether an extractor's private-data JSON marks a pronominal mention.
/// Unparseable content counts as not pronominal.
pub fn is_pronominal(private_json: &str) -> bool {
    match serde_json::from_str::<PrivateData>(private_json) {
        Ok(data) => data.justification_type.as_deref() == Some(PRONOMINAL_MENTION),
        Err(err) => {
            tracing::debug!(error = %err, "unreadable justification private data");
            false
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveredDocument {
    pub doc_id: String,
    /// Mentions in start-offset order.
    pub mentions: Vec<JustifiedMention>,
}

impl RecoveredDocument {
    pub fn new(doc_id: impl Into<String>, mut mentions: Vec<JustifiedMention>) -> Self {
        mentions.sort_by(|a, b| (a.start, a.end).cmp(&(b.start, b.end)));
        Self {
            doc_id: doc_id.into(),
            mentions,
        }
    }

    pub fn pronominal_count(&self) -> usize {
        self.mentions.iter().filter(|m| m.pronominal).count()
    }

    /// Each mention is preceded by `start - previous end` spaces (none when
    /// mentions overlap).
    pub fn render(&self, markup: Markup) -> String {
        let mut out = String::new();
        let mut last_end: i64 = 0;
        for mention in &self.mentions {
            let gap = mention.start.saturating_sub(last_end).max(0);
            out.extend(std::iter::repeat(' ').take(usize::try_from(gap).unwrap_or(0)));
            match (markup, mention.pronominal) {
                (Markup::Plain, false) => out.push_str(&mention.label),
                (Markup::Plain, true) => {
                    out.push('[');
                    out.push_str(&mention.label);
                    out.push(']');
                }
                (Markup::Html, false) => {
                    out.push_str("<u>");
                    out.push_str(&escape_html(&mention.label));
                    out.push_str("</u>");
                }
                (Markup::Html, true) => {
                    out.push_str(r#"<span style="color: red"><b>"#);
                    out.push_str(&escape_html(&mention.label));
                    out.push_str("</b></span>");
                }
            }
            last_end = mention.end;
        }
        out
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(label: &str, start: i64, end: i64, pronominal: bool) -> JustifiedMention {
        JustifiedMention {
            label: label.to_string(),
            start,
            end,
            pronominal,
        }
    }

    #[test]
    fn mentions_are_laid_out_at_their_offsets() {
        let doc = RecoveredDocument::new(
            "d1",
            vec![
                mention("he", 20, 21, true),
                mention("Obama", 3, 7, false),
                mention("Paris", 10, 14, false),
            ],
        );
        assert_eq!(doc.render(Markup::Plain), "   Obama   Paris      [he]");
        assert_eq!(doc.pronominal_count(), 1);
    }

    #[test]
    fn html_marks_pronouns_and_escapes_labels() {
        let doc = RecoveredDocument::new(
            "d1",
            vec![mention("AT&T", 0, 3, false), mention("it", 5, 6, true)],
        );
        assert_eq!(
            doc.render(Markup::Html),
            r#"<u>AT&amp;T</u>  <span style="color: red"><b>it</b></span>"#
        );
    }

    #[test]
    fn overlapping_mentions_get_no_padding() {
        let doc = RecoveredDocument::new(
            "d1",
            vec![mention("Barack Obama", 0, 11, false), mention("Obama", 7, 11, false)],
        );
        assert_eq!(doc.render(Markup::Plain), "Barack ObamaObama");
    }

    #[test]
    fn pronoun_detection_reads_private_data() {
        assert!(is_pronominal(r#"{"justificationType": "pronominal_mention"}"#));
        assert!(!is_pronominal(r#"{"justificationType": "nominal_mention"}"#));
        assert!(!is_pronominal(r#"{"other": 1}"#));
        assert!(!is_pronominal("not json"));
    }
}
