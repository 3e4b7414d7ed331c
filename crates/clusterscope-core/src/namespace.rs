//! Ontology namespaces, cluster categories, scoping and display paths.

use clusterscope_sparql::local_name;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

pub const AIDA: &str = "https://tac.nist.gov/tracks/SM-KBP/2018/ontologies/InterchangeOntology#";
pub const SEEDLING: &str = "https://tac.nist.gov/tracks/SM-KBP/2018/ontologies/SeedlingOntology#";
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const WDT: &str = "http://www.wikidata.org/prop/direct/";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Namespaces cluster and member URIs are minted in.
pub const CLUSTER_NAMESPACES: [&str; 2] = ["http://www.isi.edu/gaia", "http://www.columbia.edu"];

/// Collections that get the repository inserted into their display path.
const SCOPED_COLLECTIONS: [&str; 3] = ["entities", "events", "relations"];

const ROUTE_PREFIX: &str = "/cluster";

/// Coarse type of a cluster's prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Entity,
    Event,
    Relation,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Entity, Category::Event, Category::Relation];

    pub fn iri(self) -> &'static str {
        match self {
            Category::Entity => "https://tac.nist.gov/tracks/SM-KBP/2018/ontologies/InterchangeOntology#Entity",
            Category::Event => "https://tac.nist.gov/tracks/SM-KBP/2018/ontologies/InterchangeOntology#Event",
            Category::Relation => {
                "https://tac.nist.gov/tracks/SM-KBP/2018/ontologies/InterchangeOntology#Relation"
            }
        }
    }

    pub fn from_iri(iri: &str) -> Option<Self> {
        match iri.strip_prefix(AIDA)? {
            "Entity" => Some(Category::Entity),
            "Event" => Some(Category::Event),
            "Relation" => Some(Category::Relation),
            _ => None,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Category::Entity => "Entity",
            Category::Event => "Event",
            Category::Relation => "Relation",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Category::Entity => "entities",
            Category::Event => "events",
            Category::Relation => "relations",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entity" | "entities" => Ok(Category::Entity),
            "event" | "events" => Ok(Category::Event),
            "relation" | "relations" => Ok(Category::Relation),
            other => Err(format!(
                "unknown category `{other}` (expected entity|event|relation)"
            )),
        }
    }
}

/// Repository plus optional named graph a model is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    repo: String,
    graph: Option<String>,
}

impl Scope {
    pub fn new(repo: impl Into<String>, graph: Option<String>) -> Self {
        Self {
            repo: repo.into(),
            graph: graph.filter(|g| !g.trim().is_empty()),
        }
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn graph(&self) -> Option<&str> {
        self.graph.as_deref()
    }

    pub(crate) fn open_clause(&self) -> String {
        match &self.graph {
            Some(g) => format!("GRAPH <{g}> {{"),
            None => String::new(),
        }
    }

    pub(crate) fn close_clause(&self) -> &'static str {
        if self.graph.is_some() {
            "}"
        } else {
            ""
        }
    }

    /// File-name friendly id: `<repo>` or `<repo>-<graph with runs of
    /// non-alphanumerics collapsed to '-'>`.
    pub fn file_id(&self) -> String {
        static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
        match &self.graph {
            None => self.repo.clone(),
            Some(g) => {
                let re = NON_ALNUM.get_or_init(|| {
                    Regex::new("[^0-9a-zA-Z]+").expect("static regex is valid")
                });
                format!("{}-{}", self.repo, re.replace_all(g, "-"))
            }
        }
    }
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Local route for a cluster URI, scoped to the repository and named graph.
///
/// `http://www.isi.edu/gaia/entities/abc-cluster` in repo `r` becomes
/// `/cluster/entities/r/abc-cluster`; URIs outside the known namespaces are
/// passed as a query parameter.
pub fn display_path(uri: &str, scope: &Scope) -> String {
    let repo = scope.repo();
    let mut path = match CLUSTER_NAMESPACES.iter().find_map(|ns| uri.strip_prefix(ns)) {
        Some(rest) => {
            let rest = rest.trim_start_matches('/');
            match rest.split_once('/') {
                Some((collection, tail)) if SCOPED_COLLECTIONS.contains(&collection) => {
                    format!("{ROUTE_PREFIX}/{collection}/{repo}/{tail}")
                }
                _ => format!("{ROUTE_PREFIX}/{repo}/{rest}"),
            }
        }
        None => format!("{ROUTE_PREFIX}/{repo}?uri={}", encode(uri)),
    };
    if let Some(graph) = scope.graph() {
        path.push(if path.contains('?') { '&' } else { '?' });
        path.push_str("g=");
        path.push_str(&encode(graph));
    }
    path
}

/// URI with the minting namespace and collection stripped.
pub fn short_id(uri: &str) -> &str {
    let Some(rest) = CLUSTER_NAMESPACES.iter().find_map(|ns| uri.strip_prefix(ns)) else {
        return uri;
    };
    let rest = rest.trim_start_matches('/');
    match rest.split_once('/') {
        Some((collection, tail)) if SCOPED_COLLECTIONS.contains(&collection) => tail,
        _ => rest,
    }
}

/// Display text for a role/predicate IRI: the local name without its
/// `Type_` prefix (`...#Conflict.Attack_Attacker` -> `Attacker`).
pub fn predicate_label(iri: &str) -> &str {
    let local = local_name(iri);
    match local.find('_') {
        Some(i) if i + 1 < local.len() => &local[i + 1..],
        _ => local,
    }
}

/// `PREFIX` header shared by every query the engine composes.
pub fn prologue() -> String {
    [
        ("aida", AIDA),
        ("rdf", RDF),
        ("rdfs", RDFS),
        ("skos", SKOS),
        ("wdt", WDT),
        ("xsd", XSD),
    ]
    .iter()
    .map(|(abbr, full)| format!("PREFIX {abbr}: <{full}>\n"))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_iri() {
        for c in Category::ALL {
            assert_eq!(Category::from_iri(c.iri()), Some(c));
        }
        assert_eq!(Category::from_iri(&format!("{SEEDLING}Person")), None);
        assert_eq!("Events".parse::<Category>(), Ok(Category::Event));
        assert!("thing".parse::<Category>().is_err());
    }

    #[test]
    fn file_id_sanitizes_graph_names() {
        assert_eq!(Scope::new("eval", None).file_id(), "eval");
        assert_eq!(
            Scope::new("eval", Some("http://g/ta2#v1".into())).file_id(),
            "eval-http-g-ta2-v1"
        );
        assert_eq!(Scope::new("eval", Some("  ".into())).graph(), None);
    }

    #[test]
    fn display_path_rewrites_known_namespaces() {
        let scope = Scope::new("repo1", None);
        assert_eq!(
            display_path("http://www.isi.edu/gaia/entities/abc-cluster", &scope),
            "/cluster/entities/repo1/abc-cluster"
        );
        assert_eq!(
            display_path("http://www.columbia.edu/events/e1", &scope),
            "/cluster/events/repo1/e1"
        );
        assert_eq!(
            display_path("http://www.isi.edu/gaia/assertions/x-cluster", &scope),
            "/cluster/repo1/assertions/x-cluster"
        );
    }

    #[test]
    fn display_path_carries_graph_and_foreign_uris() {
        let scope = Scope::new("r", Some("http://g/1".into()));
        assert_eq!(
            display_path("http://www.isi.edu/gaia/entities/a", &scope),
            "/cluster/entities/r/a?g=http%3A%2F%2Fg%2F1"
        );
        assert_eq!(
            display_path("urn:x", &scope),
            "/cluster/r?uri=urn%3Ax&g=http%3A%2F%2Fg%2F1"
        );
    }

    #[test]
    fn short_ids_and_predicate_labels() {
        assert_eq!(short_id("http://www.isi.edu/gaia/entities/m1"), "m1");
        assert_eq!(short_id("urn:other"), "urn:other");
        assert_eq!(
            predicate_label(&format!("{SEEDLING}Conflict.Attack_Attacker")),
            "Attacker"
        );
        assert_eq!(predicate_label(&format!("{SEEDLING}sponsor")), "sponsor");
    }
}
