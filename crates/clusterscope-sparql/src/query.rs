//! Parameterized queries.

use std::collections::BTreeMap;

use crate::{QueryError, Term};

/// A fully-formed query: a stable name (used for logging and scripted
/// answers), the query text and its variable bindings.
///
/// Bindings are sent as an inline `VALUES` block at the top of the outermost
/// group pattern, so the text can refer to `?cluster` etc. as ordinary
/// variables and aggregates only see the bound solutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    name: &'static str,
    text: String,
    bindings: BTreeMap<String, Term>,
}

impl Query {
    pub fn new(name: &'static str, text: impl Into<String>) -> Self {
        Self {
            name,
            text: text.into(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, var: impl Into<String>, term: Term) -> Self {
        self.bindings.insert(var.into(), term);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bindings(&self) -> &BTreeMap<String, Term> {
        &self.bindings
    }

    pub fn binding(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    /// Query text with bindings joined into the `WHERE` group as a SPARQL
    /// 1.1 inline `VALUES` block.
    ///
    /// A trailing `VALUES` clause would be applied after `GROUP BY`, so the
    /// block opens the group pattern instead.
    pub fn render(&self) -> Result<String, QueryError> {
        if self.bindings.is_empty() {
            return Ok(self.text.clone());
        }
        let mut vars = Vec::with_capacity(self.bindings.len());
        let mut values = Vec::with_capacity(self.bindings.len());
        for (var, term) in &self.bindings {
            let value = term
                .to_sparql()
                .ok_or_else(|| QueryError::UnsupportedBinding { var: var.clone() })?;
            vars.push(format!("?{var}"));
            values.push(value);
        }
        let open = group_start(&self.text).ok_or_else(|| QueryError::NoGroupPattern {
            name: self.name.to_string(),
        })?;
        Ok(format!(
            "{}\n  VALUES ( {} ) {{ ( {} ) }}{}",
            &self.text[..=open],
            vars.join(" "),
            values.join(" "),
            &self.text[open + 1..]
        ))
    }
}

/// Byte offset of the `{` opening the outermost group pattern: the first
/// brace after `WHERE`, or the first brace at all for `ASK { ... }`.
fn group_start(text: &str) -> Option<usize> {
    let from = text.find("WHERE").unwrap_or(0);
    text[from..].find('{').map(|i| from + i)
}
