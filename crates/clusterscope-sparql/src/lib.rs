//! SPARQL query boundary for Clusterscope.
//!
//! This crate sits at the **interop boundary** with the remote graph store:
//!
//! - It models the RDF terms that come back in result rows.
//! - It carries parameterized queries as structured [`Query`] values
//!   (stable name + text + variable bindings).
//! - It executes them against a SPARQL 1.1 protocol endpoint
//!   ([`HttpQueryService`]) or an in-memory script ([`ScriptedQueryService`]).
//!
//! It does *not* know anything about clusters: query composition lives in
//! `clusterscope-core`.

pub mod http;
pub mod query;
pub mod scripted;
pub mod term;

use std::sync::Arc;

pub use http::{
    is_retryable, parse_ask_results, parse_select_results, with_retries, HttpOptions,
    HttpQueryService,
};
pub use query::Query;
pub use scripted::ScriptedQueryService;
pub use term::{local_name, Literal, Row, Term, XSD_DECIMAL, XSD_DOUBLE, XSD_INTEGER};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("transport error talking to {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} answered HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("invalid query response: {0}")]
    InvalidResponse(String),
    #[error("binding `?{var}` = `{value}` is not a valid {expected}")]
    MalformedBinding {
        var: String,
        value: String,
        expected: &'static str,
    },
    #[error("binding `?{var}` cannot be sent as a VALUES term")]
    UnsupportedBinding { var: String },
    #[error("query `{name}` has bindings but no group pattern to hold them")]
    NoGroupPattern { name: String },
    #[error("no scripted answer for query `{name}`")]
    Unhandled { name: String },
}

/// Executes parameterized graph queries.
///
/// Implementations are blocking; callers run one query at a time in the
/// order properties are accessed.
pub trait QueryService {
    fn select(&self, query: &Query) -> Result<Vec<Row>, QueryError>;

    fn ask(&self, query: &Query) -> Result<bool, QueryError>;
}

/// Process-wide handle to a query service.
pub type SharedQueryService = Arc<dyn QueryService + Send + Sync>;

impl<T: QueryService + ?Sized> QueryService for Arc<T> {
    fn select(&self, query: &Query) -> Result<Vec<Row>, QueryError> {
        (**self).select(query)
    }

    fn ask(&self, query: &Query) -> Result<bool, QueryError> {
        (**self).ask(query)
    }
}

impl<T: QueryService + ?Sized> QueryService for &T {
    fn select(&self, query: &Query) -> Result<Vec<Row>, QueryError> {
        (**self).select(query)
    }

    fn ask(&self, query: &Query) -> Result<bool, QueryError> {
        (**self).ask(query)
    }
}
