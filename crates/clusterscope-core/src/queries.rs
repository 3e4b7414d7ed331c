//! Query builders.
//!
//! Every query the engine issues is composed here from a [`Scope`] (the
//! optional `GRAPH <g> { ... }` wrapper) plus per-query filter and ordering
//! fragments. Each builder returns a named [`Query`]; the names are stable
//! and double as keys for scripted answers in tests.

use clusterscope_sparql::{Query, Term};

use crate::model::SortBy;
use crate::namespace::{prologue, Category, Scope};

pub const CLUSTER_EXISTS: &str = "cluster.exists";
pub const CLUSTER_LIST: &str = "cluster.list";
pub const CLUSTER_PROTOTYPE: &str = "cluster.prototype";
pub const CLUSTER_MEMBERS: &str = "cluster.members";
pub const CLUSTER_SIZE: &str = "cluster.size";
pub const CLUSTER_FORWARD: &str = "cluster.forward";
pub const CLUSTER_BACKWARD: &str = "cluster.backward";
pub const MEMBER_CLUSTER: &str = "member.cluster";
pub const MEMBER_DETAILS: &str = "member.details";
pub const MEMBER_JUSTIFICATIONS: &str = "member.justifications";
pub const MEMBER_JUSTIFICATION_LABELS: &str = "member.justification_labels";
pub const MEMBER_NAMES: &str = "member.names";
pub const MEMBER_ROLES: &str = "member.roles";
pub const MEMBER_EVENTS: &str = "member.events";
pub const DOCUMENT_JUSTIFICATIONS: &str = "document.justifications";
pub const WIKIDATA_NODE: &str = "wikidata.node";
pub const WIKIDATA_ALIASES: &str = "wikidata.aliases";
pub const SUMMARY_SIZES: &str = "summary.sizes";
pub const SUMMARY_LABELS: &str = "summary.labels";
pub const SUMMARY_TOP_LABEL: &str = "summary.top_label";
pub const REPORT_MENTIONS: &str = "report.mentions";
pub const REPORT_MENTION_TYPES: &str = "report.mention_types";
pub const REPORT_CLUSTERS: &str = "report.clusters";
pub const REPORT_CLUSTER_TYPES: &str = "report.cluster_types";
pub const REPORT_TOTAL_CLUSTERS: &str = "report.total_clusters";

/// Which end of a prototype-to-prototype statement the cluster is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

fn scoped(scope: &Scope, body: &str) -> String {
    format!("{}\n    {}\n{}", scope.open_clause(), body.trim(), scope.close_clause())
}

fn compose(name: &'static str, text: String) -> Query {
    Query::new(name, format!("{}{}", prologue(), text))
}

/// Non-prototype membership of `?cluster`.
const MEMBERSHIP: &str = "?membership aida:cluster ?cluster ;
                aida:clusterMember ?member .
    ?cluster aida:prototype ?prototype .
    FILTER (?member != ?prototype)";

pub fn cluster_exists(scope: &Scope, uri: &str) -> Query {
    let text = format!(
        "ASK {{ {} ?cluster a aida:SameAsCluster . {} }}",
        scope.open_clause(),
        scope.close_clause()
    );
    compose(CLUSTER_EXISTS, text).bind("cluster", Term::iri(uri))
}

pub fn list_clusters(
    scope: &Scope,
    category: Category,
    sort: SortBy,
    limit: Option<usize>,
    offset: usize,
) -> Query {
    let label_clause = match category {
        Category::Entity => "OPTIONAL { ?prototype aida:hasName ?label }",
        Category::Event | Category::Relation => {
            "?statement rdf:subject ?prototype ;
               rdf:predicate rdf:type ;
               rdf:object ?label ."
        }
    };
    let order = match (sort, category) {
        (SortBy::Type, _) => "?label DESC(?memberN)",
        (SortBy::Size, Category::Entity) => "DESC(?memberN)",
        (SortBy::Size, _) => "DESC(?memberN) ?label",
    };
    let body = format!(
        "?cluster aida:prototype ?prototype .
    ?prototype a <{category_iri}> .
    {label_clause}
    ?membership aida:cluster ?cluster ;
                aida:clusterMember ?member .
    FILTER (?member != ?prototype)",
        category_iri = category.iri()
    );
    let mut text = format!(
        "SELECT ?cluster ?label (COUNT(DISTINCT ?member) AS ?memberN)
WHERE {{
{}
}}
GROUP BY ?cluster ?label
ORDER BY {order}",
        scoped(scope, &body)
    );
    if let Some(limit) = limit.filter(|l| *l > 0) {
        text.push_str(&format!("\nLIMIT {limit}"));
    }
    if offset > 0 {
        text.push_str(&format!("\nOFFSET {offset}"));
    }
    compose(CLUSTER_LIST, text)
}

pub fn cluster_prototype(scope: &Scope, uri: &str) -> Query {
    let body = "?cluster aida:prototype ?prototype .
    ?prototype a ?type .
    OPTIONAL { ?prototype aida:hasName ?label }
    OPTIONAL { ?statement a rdf:Statement ;
                          rdf:subject ?prototype ;
                          rdf:predicate rdf:type ;
                          rdf:object ?category }";
    let text = format!(
        "SELECT ?prototype (MIN(?label) AS ?mlabel) ?type ?category
WHERE {{
{}
}}
GROUP BY ?prototype ?type ?category
ORDER BY ?prototype ?type ?category",
        scoped(scope, body)
    );
    compose(CLUSTER_PROTOTYPE, text).bind("cluster", Term::iri(uri))
}

/// Members of a cluster, prototype excluded.
///
/// With `with_links` the live link targets (and their confidences) are
/// selected too; without it the caller supplies them from a debug overlay.
pub fn cluster_members(scope: &Scope, uri: &str, with_links: bool) -> Query {
    let (link_vars, link_clause) = if with_links {
        (
            " ?target ?targetConf",
            "\n    OPTIONAL { ?member aida:link ?link .
               ?link aida:linkTarget ?target .
               OPTIONAL { ?link aida:confidence/aida:confidenceValue ?targetConf } }",
        )
    } else {
        ("", "")
    };
    let body = format!(
        "{MEMBERSHIP}
    OPTIONAL {{ ?member aida:hasName ?label }}{link_clause}
    OPTIONAL {{ ?statement a rdf:Statement ;
                          rdf:subject ?member ;
                          rdf:predicate rdf:type ;
                          rdf:object ?type }}"
    );
    let text = format!(
        "SELECT ?member (MIN(?label) AS ?mlabel) ?type{link_vars}
WHERE {{
{}
}}
GROUP BY ?member ?type{link_vars}
ORDER BY ?member",
        scoped(scope, &body)
    );
    compose(CLUSTER_MEMBERS, text).bind("cluster", Term::iri(uri))
}

pub fn cluster_size(scope: &Scope, uri: &str) -> Query {
    let text = format!(
        "SELECT (COUNT(DISTINCT ?member) AS ?size)
WHERE {{
{}
}}",
        scoped(scope, MEMBERSHIP)
    );
    compose(CLUSTER_SIZE, text).bind("cluster", Term::iri(uri))
}

pub fn super_edges(scope: &Scope, uri: &str, direction: Direction) -> Query {
    let body = "?s aida:prototype ?proto1 .
    ?o aida:prototype ?proto2 .
    ?se rdf:subject ?proto1 ;
        rdf:predicate ?p ;
        rdf:object ?proto2 .
    OPTIONAL { ?se aida:confidence/aida:confidenceValue ?conf }";
    let text = format!(
        "SELECT ?s ?p ?o ?conf
WHERE {{
{}
}}",
        scoped(scope, body)
    );
    match direction {
        Direction::Forward => compose(CLUSTER_FORWARD, text).bind("s", Term::iri(uri)),
        Direction::Backward => compose(CLUSTER_BACKWARD, text).bind("o", Term::iri(uri)),
    }
}

pub fn member_cluster(scope: &Scope, member: &str) -> Query {
    let body = "?membership aida:cluster ?cluster ;
                aida:clusterMember ?member .";
    let text = format!(
        "SELECT ?cluster
WHERE {{
{}
}}
ORDER BY ?cluster",
        scoped(scope, body)
    );
    compose(MEMBER_CLUSTER, text).bind("member", Term::iri(member))
}

pub fn member_details(scope: &Scope, member: &str) -> Query {
    let body = "?statement rdf:subject ?member ;
               rdf:predicate rdf:type ;
               rdf:object ?type .
    OPTIONAL { ?member aida:hasName ?label }
    OPTIONAL { ?member aida:justifiedBy ?justification .
               ?justification skos:prefLabel ?label }
    OPTIONAL { ?member aida:link/aida:linkTarget ?target }";
    let text = format!(
        "SELECT ?label ?type ?target
WHERE {{
{}
}}
LIMIT 1",
        scoped(scope, body)
    );
    compose(MEMBER_DETAILS, text).bind("member", Term::iri(member))
}

pub fn member_justifications(scope: &Scope, member: &str) -> Query {
    let body = "?member aida:justifiedBy ?justification .
    ?justification aida:source ?source ;
                   aida:startOffset ?start ;
                   aida:endOffsetInclusive ?end .";
    let text = format!(
        "SELECT DISTINCT ?source ?start ?end
WHERE {{
{}
}}
ORDER BY ?start",
        scoped(scope, body)
    );
    compose(MEMBER_JUSTIFICATIONS, text).bind("member", Term::iri(member))
}

fn label_histogram(name: &'static str, scope: &Scope, path: &str, member: &str) -> Query {
    let body = format!("?member {path} ?label .");
    let text = format!(
        "SELECT ?label (COUNT(?label) AS ?n)
WHERE {{
{}
}}
GROUP BY ?label
ORDER BY DESC(?n)",
        scoped(scope, &body)
    );
    compose(name, text).bind("member", Term::iri(member))
}

pub fn member_justification_labels(scope: &Scope, member: &str) -> Query {
    label_histogram(
        MEMBER_JUSTIFICATION_LABELS,
        scope,
        "aida:justifiedBy/skos:prefLabel",
        member,
    )
}

pub fn member_names(scope: &Scope, member: &str) -> Query {
    label_histogram(MEMBER_NAMES, scope, "aida:hasName", member)
}

/// Arguments of an event/relation mention: `(?pred, ?obj, ?objtype, ?objlabel)`.
pub fn member_roles(scope: &Scope, member: &str) -> Query {
    let body = "?statement rdf:subject ?event ;
               rdf:predicate ?pred ;
               rdf:object ?obj .
    ?objstate rdf:subject ?obj ;
              rdf:predicate rdf:type ;
              rdf:object ?objtype .
    OPTIONAL { ?obj aida:hasName ?objlbl }";
    let text = format!(
        "SELECT ?pred ?obj ?objtype (MIN(?objlbl) AS ?objlabel)
WHERE {{
{}
}}
GROUP BY ?pred ?obj ?objtype
ORDER BY ?pred ?obj",
        scoped(scope, body)
    );
    compose(MEMBER_ROLES, text).bind("event", Term::iri(member))
}

/// Events in which a mention is an argument:
/// `(?pred, ?event, ?eventtype, ?eventlabel)`.
pub fn member_events(scope: &Scope, member: &str) -> Query {
    let body = "?event a aida:Event .
    ?statement rdf:subject ?event ;
               rdf:predicate ?pred ;
               rdf:object ?obj .
    ?eventstate rdf:subject ?event ;
                rdf:predicate rdf:type ;
                rdf:object ?eventtype .
    OPTIONAL { ?event aida:justifiedBy/skos:prefLabel ?lbl }";
    let text = format!(
        "SELECT ?pred ?event ?eventtype (MIN(?lbl) AS ?eventlabel)
WHERE {{
{}
}}
GROUP BY ?pred ?event ?eventtype
ORDER BY ?pred ?event",
        scoped(scope, body)
    );
    compose(MEMBER_EVENTS, text).bind("obj", Term::iri(member))
}

/// Text justifications of one source document in offset order, with the
/// justification kind recorded by the extractor when present.
pub fn document_justifications(scope: &Scope, doc_id: &str) -> Query {
    let body = "?justification a aida:TextJustification ;
                   skos:prefLabel ?label ;
                   aida:source ?source ;
                   aida:startOffset ?start ;
                   aida:endOffsetInclusive ?end .
    OPTIONAL { ?justification aida:privateData ?privateData .
               ?privateData aida:jsonContent ?kind }";
    let text = format!(
        "SELECT DISTINCT ?label ?start ?end ?kind
WHERE {{
{}
}}
ORDER BY ?start ?end",
        scoped(scope, body)
    );
    compose(DOCUMENT_JUSTIFICATIONS, text).bind("source", Term::literal(doc_id))
}

pub fn wikidata_node(freebase_id: &str) -> Query {
    let text = "SELECT ?qid ?label WHERE {
  ?qid wdt:P646 ?freebase .
  ?qid rdfs:label ?label FILTER (lang(?label) = \"en\") .
}
LIMIT 1"
        .to_string();
    compose(WIKIDATA_NODE, text).bind("freebase", Term::literal(freebase_id))
}

pub fn wikidata_aliases(freebase_id: &str) -> Query {
    let text = "SELECT ?qid ?alias WHERE {
  ?qid wdt:P646 ?freebase .
  ?qid skos:altLabel ?alias FILTER (lang(?alias) = \"en\") .
}"
    .to_string();
    compose(WIKIDATA_ALIASES, text).bind("freebase", Term::literal(freebase_id))
}

pub fn summary_sizes(scope: &Scope) -> Query {
    let text = format!(
        "SELECT ?cluster (COUNT(DISTINCT ?member) AS ?size)
WHERE {{
{}
}}
GROUP BY ?cluster",
        scoped(scope, MEMBERSHIP)
    );
    compose(SUMMARY_SIZES, text)
}

pub fn summary_labels(scope: &Scope) -> Query {
    let body = "?cluster aida:prototype ?prototype .
    OPTIONAL { ?prototype a ?coarse }
    OPTIONAL { ?prototype aida:hasName ?label }
    OPTIONAL { ?statement a rdf:Statement ;
                          rdf:subject ?prototype ;
                          rdf:predicate rdf:type ;
                          rdf:object ?type }";
    let text = format!(
        "SELECT ?cluster (MIN(?label) AS ?mlabel) ?type ?coarse
WHERE {{
{}
}}
GROUP BY ?cluster ?type ?coarse",
        scoped(scope, body)
    );
    compose(SUMMARY_LABELS, text)
}

/// Most frequent justification label across a cluster's members.
pub fn summary_top_label(scope: &Scope, cluster: &str) -> Query {
    let body = "?ms aida:cluster ?cluster ;
        aida:clusterMember/aida:justifiedBy/skos:prefLabel ?lbl .";
    let text = format!(
        "SELECT ?lbl
WHERE {{
{}
}}
GROUP BY ?lbl
ORDER BY DESC(COUNT(?lbl))
LIMIT 1",
        scoped(scope, body)
    );
    compose(SUMMARY_TOP_LABEL, text).bind("cluster", Term::iri(cluster))
}

pub fn report_mentions(scope: &Scope, category: Category) -> Query {
    let body = format!(
        "?e a <{}> .
    FILTER NOT EXISTS {{ ?cluster aida:prototype ?e }}",
        category.iri()
    );
    let text = format!(
        "SELECT (COUNT(?e) AS ?n)
WHERE {{
{}
}}",
        scoped(scope, &body)
    );
    compose(REPORT_MENTIONS, text)
}

/// Fine-type histogram of mentions (`prototypes == false`) or cluster
/// prototypes (`prototypes == true`) of a category.
pub fn report_types(scope: &Scope, category: Category, prototypes: bool) -> Query {
    let filter = if prototypes {
        "?cluster aida:prototype ?e ."
    } else {
        "FILTER NOT EXISTS { ?cluster aida:prototype ?e }"
    };
    let body = format!(
        "?e a <{}> .
    ?s rdf:subject ?e ;
       rdf:predicate rdf:type ;
       rdf:object ?cate .
    {filter}",
        category.iri()
    );
    let text = format!(
        "SELECT ?cate (COUNT(?e) AS ?n)
WHERE {{
{}
}}
GROUP BY ?cate",
        scoped(scope, &body)
    );
    let name = if prototypes {
        REPORT_CLUSTER_TYPES
    } else {
        REPORT_MENTION_TYPES
    };
    compose(name, text)
}

pub fn report_clusters(scope: &Scope, category: Category) -> Query {
    let body = format!(
        "?c aida:prototype ?p .
    ?p a <{}> .",
        category.iri()
    );
    let text = format!(
        "SELECT (COUNT(?c) AS ?n)
WHERE {{
{}
}}",
        scoped(scope, &body)
    );
    compose(REPORT_CLUSTERS, text)
}

pub fn report_total_clusters(scope: &Scope) -> Query {
    let text = format!(
        "SELECT (COUNT(?c) AS ?n)
WHERE {{
{}
}}",
        scoped(scope, "?c a aida:SameAsCluster .")
    );
    compose(REPORT_TOTAL_CLUSTERS, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unscoped() -> Scope {
        Scope::new("repo", None)
    }

    #[test]
    fn every_query_carries_the_prologue() {
        let q = cluster_size(&unscoped(), "http://ex/c");
        assert!(q.text().starts_with("PREFIX aida: <"));
        assert!(q.text().contains("PREFIX skos: <"));
    }

    #[test]
    fn exists_check_is_graph_scoped() {
        let plain = cluster_exists(&unscoped(), "http://ex/c");
        assert!(plain.text().ends_with("ASK {  ?cluster a aida:SameAsCluster .  }"));
        assert_eq!(plain.binding("cluster"), Some(&Term::iri("http://ex/c")));

        let scoped = cluster_exists(&Scope::new("repo", Some("http://g".into())), "http://ex/c");
        assert!(scoped
            .text()
            .ends_with("ASK { GRAPH <http://g> { ?cluster a aida:SameAsCluster . } }"));
    }

    #[test]
    fn list_query_orders_and_paginates_server_side() {
        let q = list_clusters(&unscoped(), Category::Entity, SortBy::Size, Some(10), 20);
        let text = q.text();
        assert!(text.contains("OPTIONAL { ?prototype aida:hasName ?label }"));
        assert!(text.contains(&format!("?prototype a <{}>", Category::Entity.iri())));
        assert!(text.contains("ORDER BY DESC(?memberN)\nLIMIT 10\nOFFSET 20"));

        let q = list_clusters(&unscoped(), Category::Event, SortBy::Type, None, 0);
        let text = q.text();
        assert!(text.contains("rdf:object ?label ."));
        assert!(text.trim_end().ends_with("ORDER BY ?label DESC(?memberN)"));
        assert!(!text.contains("LIMIT"));
        assert!(!text.contains("OFFSET"));

        let q = list_clusters(&unscoped(), Category::Event, SortBy::Size, Some(5), 0);
        assert!(q.text().contains("ORDER BY DESC(?memberN) ?label\nLIMIT 5"));
    }

    #[test]
    fn membership_queries_exclude_the_prototype() {
        for q in [
            cluster_members(&unscoped(), "http://ex/c", true),
            cluster_size(&unscoped(), "http://ex/c"),
            summary_sizes(&unscoped()),
        ] {
            assert!(q.text().contains("FILTER (?member != ?prototype)"), "{}", q.name());
        }
    }

    #[test]
    fn member_query_link_columns_depend_on_overlay() {
        let live = cluster_members(&unscoped(), "http://ex/c", true);
        assert!(live.text().contains("?target ?targetConf"));
        let overlay = cluster_members(&unscoped(), "http://ex/c", false);
        assert!(!overlay.text().contains("?target"));
        assert!(overlay.text().contains("GROUP BY ?member ?type\n"));
    }

    #[test]
    fn edge_queries_bind_the_requested_end() {
        let f = super_edges(&unscoped(), "http://ex/c", Direction::Forward);
        assert_eq!(f.name(), CLUSTER_FORWARD);
        assert!(f.binding("s").is_some() && f.binding("o").is_none());
        let b = super_edges(&unscoped(), "http://ex/c", Direction::Backward);
        assert_eq!(b.name(), CLUSTER_BACKWARD);
        assert!(b.binding("o").is_some() && b.binding("s").is_none());
        assert!(f.text().contains("OPTIONAL { ?se aida:confidence/aida:confidenceValue ?conf }"));
    }

    #[test]
    fn bound_aggregates_filter_before_grouping() {
        let scope = Scope::new("repo", Some("http://g".into()));
        for q in [
            cluster_size(&scope, "http://ex/c1"),
            cluster_members(&scope, "http://ex/c1", true),
            cluster_prototype(&scope, "http://ex/c1"),
            member_names(&scope, "http://ex/m1"),
            member_roles(&scope, "http://ex/m1"),
            member_events(&scope, "http://ex/m1"),
            summary_top_label(&scope, "http://ex/c1"),
        ] {
            let text = q.render().unwrap();
            let values = text.find("VALUES (").expect(q.name());
            let body = text.find("GRAPH <http://g>").expect(q.name());
            assert!(text.find("WHERE {").unwrap() < values, "{}", q.name());
            assert!(values < body, "{}", q.name());
            if let Some(group) = text.find("GROUP BY") {
                assert!(body < group, "{}", q.name());
            }
            assert_eq!(text.matches("VALUES").count(), 1, "{}", q.name());
        }
    }

    #[test]
    fn event_and_document_queries_bind_their_keys() {
        let events = member_events(&unscoped(), "http://ex/m1");
        assert_eq!(events.binding("obj"), Some(&Term::iri("http://ex/m1")));
        assert!(events.text().contains("?event a aida:Event ."));
        let doc = document_justifications(&unscoped(), "HC000T6IV");
        assert_eq!(doc.binding("source"), Some(&Term::literal("HC000T6IV")));
        assert!(doc.text().contains("ORDER BY ?start"));
    }

    #[test]
    fn report_type_queries_switch_prototype_filter() {
        let mentions = report_types(&unscoped(), Category::Event, false);
        assert_eq!(mentions.name(), REPORT_MENTION_TYPES);
        assert!(mentions.text().contains("FILTER NOT EXISTS"));
        let clusters = report_types(&unscoped(), Category::Event, true);
        assert_eq!(clusters.name(), REPORT_CLUSTER_TYPES);
        assert!(!clusters.text().contains("FILTER NOT EXISTS"));
    }
}
