//! RDF term model for result rows and query bindings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::QueryError;

pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// Last path or fragment segment of an IRI (`...#Person` -> `Person`).
pub fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal(Literal),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    pub fn literal(lexical: impl Into<String>) -> Self {
        Self::Literal(Literal {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        })
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Literal(Literal {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        })
    }

    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal(Literal {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        })
    }

    pub fn integer(value: i64) -> Self {
        Self::typed(value.to_string(), XSD_INTEGER)
    }

    pub fn double(value: f64) -> Self {
        Self::typed(value.to_string(), XSD_DOUBLE)
    }

    /// The IRI, blank node label or literal lexical form.
    pub fn as_str(&self) -> &str {
        match self {
            Term::Iri(iri) => iri,
            Term::BlankNode(bn) => bn,
            Term::Literal(lit) => &lit.lexical,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    /// Human-readable form: IRIs shorten to their local name.
    pub fn display_text(&self) -> &str {
        match self {
            Term::Iri(iri) => local_name(iri),
            other => other.as_str(),
        }
    }

    /// SPARQL surface syntax, as used inside a `VALUES` block.
    ///
    /// Blank nodes have no stable surface form outside the store and are
    /// rejected.
    pub fn to_sparql(&self) -> Option<String> {
        match self {
            Term::Iri(iri) => Some(format!("<{iri}>")),
            Term::BlankNode(_) => None,
            Term::Literal(lit) => {
                let quoted = format!("\"{}\"", escape_literal(&lit.lexical));
                Some(match (&lit.datatype, &lit.language) {
                    (_, Some(lang)) => format!("{quoted}@{lang}"),
                    (Some(dt), None) => format!("{quoted}^^<{dt}>"),
                    (None, None) => quoted,
                })
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BlankNode(bn) => write!(f, "_:{bn}"),
            Term::Literal(lit) => write!(f, "\"{}\"", escape_literal(&lit.lexical)),
        }
    }
}

fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// One solution of a SELECT query. Unbound variables are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    bindings: BTreeMap<String, Term>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, var: impl Into<String>, term: Term) -> Self {
        self.bindings.insert(var.into(), term);
        self
    }

    pub fn insert(&mut self, var: impl Into<String>, term: Term) {
        self.bindings.insert(var.into(), term);
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    /// Bound value as text, whatever its kind.
    pub fn text(&self, var: &str) -> Option<&str> {
        self.get(var).map(Term::as_str)
    }

    /// Bound value as owned text; empty strings count as unbound.
    pub fn non_empty(&self, var: &str) -> Option<String> {
        self.text(var)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    }

    /// Parse a bound literal; `Ok(None)` when the variable is unbound.
    pub fn parse<T: FromStr>(&self, var: &str, expected: &'static str) -> Result<Option<T>, QueryError> {
        let Some(raw) = self.text(var) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| QueryError::MalformedBinding {
                var: var.to_string(),
                value: raw.to_string(),
                expected,
            })
    }

    /// Integer count, tolerating decimal lexical forms such as `"3.0"`.
    pub fn count(&self, var: &str) -> Result<Option<u64>, QueryError> {
        if let Ok(Some(v)) = self.parse::<u64>(var, "integer") {
            return Ok(Some(v));
        }
        match self.parse::<f64>(var, "integer")? {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v.round() as u64)),
            Some(_) => Err(QueryError::MalformedBinding {
                var: var.to_string(),
                value: self.text(var).unwrap_or_default().to_string(),
                expected: "integer",
            }),
            None => Ok(None),
        }
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}
