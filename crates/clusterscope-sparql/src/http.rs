//! Blocking SPARQL 1.1 protocol client.
//!
//! Queries are POSTed as `application/x-www-form-urlencoded` and answers are
//! read as `application/sparql-results+json`. Transport failures and 5xx
//! answers are retried a bounded number of times; everything else is
//! surfaced to the caller immediately.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use crate::{Literal, Query, QueryError, QueryService, Row, Term};

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 250,
            username: None,
            password: None,
            user_agent: concat!("clusterscope/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

pub struct HttpQueryService {
    client: Client,
    endpoint: String,
    options: HttpOptions,
}

impl HttpQueryService {
    pub fn new(endpoint: impl Into<String>, options: HttpOptions) -> Result<Self, QueryError> {
        let endpoint = endpoint.into();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(SPARQL_RESULTS_JSON));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("clusterscope")),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| QueryError::Transport {
                endpoint: endpoint.clone(),
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint,
            options,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send_once(&self, text: &str) -> Result<String, QueryError> {
        let mut request = self.client.post(&self.endpoint).form(&[("query", text)]);
        if let Some(user) = &self.options.username {
            request = request.basic_auth(user, self.options.password.as_deref());
        }
        let resp = request.send().map_err(|e| QueryError::Transport {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        })?;
        let status = resp.status();
        let body = resp.text().map_err(|e| QueryError::Transport {
            endpoint: self.endpoint.clone(),
            message: format!("failed to read body: {e}"),
        })?;
        if !status.is_success() {
            return Err(QueryError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }
        Ok(body)
    }

    fn execute(&self, query: &Query) -> Result<String, QueryError> {
        let text = query.render()?;
        with_retries(&self.options, query.name(), is_retryable, |attempt| {
            tracing::debug!(query = query.name(), attempt, endpoint = %self.endpoint, "sparql request");
            self.send_once(&text)
        })
    }
}

/// Runs `op` until it succeeds, fails with an error `retryable` rejects, or
/// `options.max_retries` extra attempts are spent. The wait before retry `n`
/// is `n * retry_backoff_ms`.
pub fn with_retries<T, E: std::fmt::Display>(
    options: &HttpOptions,
    request: &str,
    retryable: impl Fn(&E) -> bool,
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, E> {
    let mut attempt: u32 = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt < options.max_retries && retryable(&err) => {
                attempt += 1;
                tracing::warn!(request, attempt, error = %err, "request failed; retrying");
                thread::sleep(Duration::from_millis(
                    options.retry_backoff_ms.saturating_mul(u64::from(attempt)),
                ));
            }
            Err(err) => return Err(err),
        }
    }
}

impl QueryService for HttpQueryService {
    fn select(&self, query: &Query) -> Result<Vec<Row>, QueryError> {
        let body = self.execute(query)?;
        parse_select_results(&body)
    }

    fn ask(&self, query: &Query) -> Result<bool, QueryError> {
        let body = self.execute(query)?;
        parse_ask_results(&body)
    }
}

/// Transport failures and 5xx answers.
pub fn is_retryable(err: &QueryError) -> bool {
    match err {
        QueryError::Transport { .. } => true,
        QueryError::Status { status, .. } => *status >= 500,
        _ => false,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

// ============================================================================
// application/sparql-results+json
// ============================================================================

#[derive(Debug, Deserialize)]
struct ResultsDocument {
    #[serde(default)]
    results: Option<ResultBindings>,
    #[serde(default)]
    boolean: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ResultBindings {
    #[serde(default)]
    bindings: Vec<BTreeMap<String, JsonTerm>>,
}

#[derive(Debug, Deserialize)]
struct JsonTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(default)]
    datatype: Option<String>,
    #[serde(default, rename = "xml:lang")]
    lang: Option<String>,
}

impl JsonTerm {
    fn into_term(self) -> Result<Term, QueryError> {
        match self.kind.as_str() {
            "uri" => Ok(Term::Iri(self.value)),
            "bnode" => Ok(Term::BlankNode(self.value)),
            "literal" | "typed-literal" => Ok(Term::Literal(Literal {
                lexical: self.value,
                datatype: self.datatype,
                language: self.lang,
            })),
            other => Err(QueryError::InvalidResponse(format!(
                "unknown binding type `{other}`"
            ))),
        }
    }
}

pub fn parse_select_results(body: &str) -> Result<Vec<Row>, QueryError> {
    let doc: ResultsDocument = serde_json::from_str(body)
        .map_err(|e| QueryError::InvalidResponse(format!("not sparql-results+json: {e}")))?;
    let Some(results) = doc.results else {
        return Err(QueryError::InvalidResponse(
            "SELECT answer has no `results` member".to_string(),
        ));
    };
    results
        .bindings
        .into_iter()
        .map(|solution| {
            let mut row = Row::new();
            for (var, term) in solution {
                row.insert(var, term.into_term()?);
            }
            Ok(row)
        })
        .collect()
}

pub fn parse_ask_results(body: &str) -> Result<bool, QueryError> {
    let doc: ResultsDocument = serde_json::from_str(body)
        .map_err(|e| QueryError::InvalidResponse(format!("not sparql-results+json: {e}")))?;
    doc.boolean.ok_or_else(|| {
        QueryError::InvalidResponse("ASK answer has no `boolean` member".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select_bindings_of_every_kind() {
        let body = r#"{
          "head": {"vars": ["cluster", "label", "n", "b"]},
          "results": {"bindings": [
            {"cluster": {"type": "uri", "value": "http://ex/c1"},
             "label": {"type": "literal", "value": "Obama", "xml:lang": "en"},
             "n": {"type": "typed-literal", "value": "3", "datatype": "http://www.w3.org/2001/XMLSchema#integer"},
             "b": {"type": "bnode", "value": "x1"}},
            {"cluster": {"type": "uri", "value": "http://ex/c2"}}
          ]}
        }"#;
        let rows = parse_select_results(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("cluster"), Some(&Term::iri("http://ex/c1")));
        assert_eq!(rows[0].get("label"), Some(&Term::lang("Obama", "en")));
        assert_eq!(rows[0].count("n").unwrap(), Some(3));
        assert_eq!(rows[0].get("b"), Some(&Term::BlankNode("x1".into())));
        assert_eq!(rows[1].get("label"), None);
    }

    #[test]
    fn parses_ask_boolean() {
        assert!(parse_ask_results(r#"{"head": {}, "boolean": true}"#).unwrap());
        assert!(!parse_ask_results(r#"{"boolean": false}"#).unwrap());
        assert!(parse_ask_results(r#"{"head": {}}"#).is_err());
    }

    #[test]
    fn rejects_non_json_bodies() {
        assert!(matches!(
            parse_select_results("<html>oops</html>"),
            Err(QueryError::InvalidResponse(_))
        ));
    }

    #[test]
    fn only_transport_and_server_errors_retry() {
        assert!(is_retryable(&QueryError::Transport {
            endpoint: "e".into(),
            message: "reset".into()
        }));
        assert!(is_retryable(&QueryError::Status {
            endpoint: "e".into(),
            status: 503,
            body: String::new()
        }));
        assert!(!is_retryable(&QueryError::Status {
            endpoint: "e".into(),
            status: 400,
            body: String::new()
        }));
        assert!(!is_retryable(&QueryError::InvalidResponse("x".into())));
    }

    #[test]
    fn retries_stop_at_the_configured_bound() {
        let options = HttpOptions {
            max_retries: 2,
            retry_backoff_ms: 0,
            ..HttpOptions::default()
        };
        let mut calls = Vec::new();
        let err = with_retries(&options, "t", is_retryable, |attempt| -> Result<(), QueryError> {
            calls.push(attempt);
            Err(QueryError::Status {
                endpoint: "e".into(),
                status: 502,
                body: String::new(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, QueryError::Status { status: 502, .. }));
        assert_eq!(calls, vec![0, 1, 2]);
    }

    #[test]
    fn retry_recovers_and_skips_client_errors() {
        let options = HttpOptions {
            max_retries: 3,
            retry_backoff_ms: 0,
            ..HttpOptions::default()
        };
        let mut calls = 0;
        let value = with_retries(&options, "t", is_retryable, |attempt| {
            calls += 1;
            if attempt == 0 {
                Err(QueryError::Transport {
                    endpoint: "e".into(),
                    message: "reset".into(),
                })
            } else {
                Ok(7)
            }
        })
        .unwrap();
        assert_eq!((value, calls), (7, 2));

        let mut calls = 0;
        let result: Result<(), QueryError> = with_retries(&options, "t", is_retryable, |_| {
            calls += 1;
            Err(QueryError::InvalidResponse("x".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
