//! In-memory query service answering by query name.
//!
//! Used by tests and offline demos: each query name is mapped to a closure
//! that inspects the bindings and produces rows. Every executed query is
//! recorded so callers can assert on what was (and was not) asked.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::{Query, QueryError, QueryService, Row};

type SelectHandler = Box<dyn Fn(&Query) -> Result<Vec<Row>, QueryError> + Send + Sync>;
type AskHandler = Box<dyn Fn(&Query) -> Result<bool, QueryError> + Send + Sync>;

#[derive(Default)]
pub struct ScriptedQueryService {
    selects: HashMap<&'static str, SelectHandler>,
    asks: HashMap<&'static str, AskHandler>,
    strict: bool,
    log: Mutex<Vec<Query>>,
}

impl ScriptedQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unscripted queries fail with [`QueryError::Unhandled`] instead of
    /// answering with no rows / `false`.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn on_select<F>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(&Query) -> Vec<Row> + Send + Sync + 'static,
    {
        self.selects
            .insert(name, Box::new(move |q: &Query| Ok(handler(q))));
        self
    }

    pub fn on_select_result<F>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(&Query) -> Result<Vec<Row>, QueryError> + Send + Sync + 'static,
    {
        self.selects.insert(name, Box::new(handler));
        self
    }

    pub fn on_ask<F>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(&Query) -> bool + Send + Sync + 'static,
    {
        self.asks.insert(name, Box::new(move |q: &Query| Ok(handler(q))));
        self
    }

    /// Queries executed so far, in order.
    pub fn executed(&self) -> Vec<Query> {
        self.log.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.log.lock().iter().filter(|q| q.name() == name).count()
    }

    fn record(&self, query: &Query) {
        self.log.lock().push(query.clone());
    }
}

impl QueryService for ScriptedQueryService {
    fn select(&self, query: &Query) -> Result<Vec<Row>, QueryError> {
        self.record(query);
        match self.selects.get(query.name()) {
            Some(handler) => handler(query),
            None if self.strict => Err(QueryError::Unhandled {
                name: query.name().to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    fn ask(&self, query: &Query) -> Result<bool, QueryError> {
        self.record(query);
        match self.asks.get(query.name()) {
            Some(handler) => handler(query),
            None if self.strict => Err(QueryError::Unhandled {
                name: query.name().to_string(),
            }),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Term;

    #[test]
    fn answers_by_name_and_records_calls() {
        let svc = ScriptedQueryService::new()
            .on_select("rows", |q| {
                let who = q.binding("who").map(|t| t.as_str().to_string()).unwrap_or_default();
                vec![Row::new().with("name", Term::literal(who))]
            })
            .on_ask("exists", |_| true);

        let rows = svc
            .select(&Query::new("rows", "SELECT").bind("who", Term::literal("ada")))
            .unwrap();
        assert_eq!(rows[0].text("name"), Some("ada"));
        assert!(svc.ask(&Query::new("exists", "ASK")).unwrap());
        assert!(svc.select(&Query::new("other", "SELECT")).unwrap().is_empty());
        assert_eq!(svc.count("rows"), 1);
        assert_eq!(svc.executed().len(), 3);
    }

    #[test]
    fn strict_mode_rejects_unscripted_queries() {
        let svc = ScriptedQueryService::new().strict();
        assert!(matches!(
            svc.ask(&Query::new("nope", "ASK")),
            Err(QueryError::Unhandled { name }) if name == "nope"
        ));
    }
}
