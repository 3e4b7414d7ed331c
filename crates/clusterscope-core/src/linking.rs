//! Resolution of knowledge-base link targets to Wikidata nodes.

use clusterscope_sparql::{local_name, QueryService, SharedQueryService};
use serde::{Deserialize, Serialize};

use crate::queries;
use crate::{Error, Result};

/// Wikidata node matched through its Freebase id (`wdt:P646`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalNode {
    /// Q-id, e.g. `Q76`.
    pub id: String,
    pub url: String,
    pub label: String,
    pub aliases: Vec<String>,
}

/// Freebase id path for a link target, `None` for unlinked (`...:NIL...`)
/// targets.
///
/// `LDC2015E42:m.0d06m5` becomes `/m/0d06m5`.
pub fn normalize_link_target(target: &str) -> Option<String> {
    let target = target.trim();
    if target.is_empty() || target.contains(":NIL") {
        return None;
    }
    let tail = match target.find(':') {
        Some(i) => &target[i + 1..],
        None => target,
    };
    Some(format!("/{}", tail.replace('.', "/")))
}

pub trait ExternalLinkLookup {
    /// Node for a normalized Freebase id, if the knowledge base knows it.
    fn lookup(&self, freebase_id: &str) -> Result<Option<ExternalNode>>;
}

/// [`ExternalLinkLookup`] over a Wikidata SPARQL endpoint.
pub struct WikidataLookup {
    service: SharedQueryService,
}

impl WikidataLookup {
    pub fn new(service: SharedQueryService) -> Self {
        Self { service }
    }
}

impl ExternalLinkLookup for WikidataLookup {
    fn lookup(&self, freebase_id: &str) -> Result<Option<ExternalNode>> {
        let rows = self
            .service
            .select(&queries::wikidata_node(freebase_id))
            .map_err(|e| Error::LinkLookup(format!("{freebase_id}: {e}")))?;
        let Some((url, label)) = rows
            .iter()
            .find_map(|r| Some((r.non_empty("qid")?, r.non_empty("label").unwrap_or_default())))
        else {
            tracing::debug!(freebase_id, "no wikidata node");
            return Ok(None);
        };

        let aliases = self
            .service
            .select(&queries::wikidata_aliases(freebase_id))
            .map_err(|e| Error::LinkLookup(format!("{freebase_id}: {e}")))?
            .iter()
            .filter_map(|r| r.non_empty("alias"))
            .collect();

        Ok(Some(ExternalNode {
            id: local_name(&url).to_string(),
            url,
            label,
            aliases,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterscope_sparql::{QueryError, Row, ScriptedQueryService, Term};
    use std::sync::Arc;

    #[test]
    fn normalizes_freebase_targets() {
        assert_eq!(
            normalize_link_target("LDC2015E42:m.0d06m5").as_deref(),
            Some("/m/0d06m5")
        );
        assert_eq!(normalize_link_target("LDC2015E42:NIL00012"), None);
        assert_eq!(normalize_link_target(""), None);
        assert_eq!(normalize_link_target("m.01").as_deref(), Some("/m/01"));
    }

    #[test]
    fn resolves_node_and_aliases() {
        let svc = ScriptedQueryService::new()
            .on_select(queries::WIKIDATA_NODE, |q| {
                assert_eq!(q.binding("freebase"), Some(&Term::literal("/m/02mjmr")));
                vec![Row::new()
                    .with("qid", Term::iri("http://www.wikidata.org/entity/Q76"))
                    .with("label", Term::lang("Barack Obama", "en"))]
            })
            .on_select(queries::WIKIDATA_ALIASES, |_| {
                vec![
                    Row::new().with("alias", Term::lang("Obama", "en")),
                    Row::new().with("alias", Term::lang("Barack Hussein Obama II", "en")),
                ]
            });
        let lookup = WikidataLookup::new(Arc::new(svc));
        let node = lookup.lookup("/m/02mjmr").unwrap().unwrap();
        assert_eq!(node.id, "Q76");
        assert_eq!(node.label, "Barack Obama");
        assert_eq!(node.aliases.len(), 2);
    }

    #[test]
    fn unknown_ids_and_failures() {
        let lookup = WikidataLookup::new(Arc::new(ScriptedQueryService::new()));
        assert_eq!(lookup.lookup("/m/none").unwrap(), None);

        let failing = ScriptedQueryService::new().on_select_result(queries::WIKIDATA_NODE, |_| {
            Err(QueryError::InvalidResponse("boom".into()))
        });
        let lookup = WikidataLookup::new(Arc::new(failing));
        assert!(matches!(lookup.lookup("/m/x"), Err(Error::LinkLookup(_))));
    }
}
