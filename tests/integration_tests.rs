//! Integration tests for the cluster graph engine
//!
//! These tests drive the whole pipeline against a scripted store:
//! - ClusterModel → Cluster → lazy prototype / size / super edges
//! - Cluster → ground-truth comparison (file source)
//! - NeighborhoodExpander → GraphLayoutBuilder → DOT
//! - SummaryCaches / DebugStore on disk
//!
//! Run with: cargo test --test integration_tests

use std::fs;
use std::sync::Arc;

use clusterscope_core::namespace::SEEDLING;
use clusterscope_core::queries;
use clusterscope_core::{
    Category, ClusterModel, DebugStore, FileGroundTruth, GraphLayoutBuilder, GroundTruthStatus,
    NeighborhoodExpander, NeighborhoodOptions, Scope, SummaryCache, SummaryCaches, SuperEdge,
};
use clusterscope_sparql::{Query, Row, ScriptedQueryService, Term};
use tempfile::tempdir;

const C: &str = "http://www.isi.edu/gaia/entities/obama-cluster";
const P: &str = "http://www.isi.edu/gaia/entities/obama";
const REL: &str = "http://www.isi.edu/gaia/relations/resident-cluster";
const PARIS: &str = "http://www.isi.edu/gaia/entities/paris-cluster";
const OTHER: &str = "http://www.isi.edu/gaia/entities/other-cluster";

fn member(i: usize) -> String {
    format!("http://www.isi.edu/gaia/entities/m{i}")
}

fn bound(q: &Query, var: &str) -> String {
    q.binding(var)
        .map(|t| t.as_str().to_string())
        .unwrap_or_default()
}

fn statement(s: &str, p: &str, o: &str, conf: f64) -> Row {
    Row::new()
        .with("s", Term::iri(s))
        .with("p", Term::iri(p))
        .with("o", Term::iri(o))
        .with("conf", Term::double(conf))
}

/// The store: `C` has three members and an unlabeled Entity prototype, one
/// outgoing statement at confidence 0.9 and one incoming from a relation
/// hub that also points at `PARIS`.
fn store() -> ScriptedQueryService {
    let attacker = format!("{SEEDLING}Conflict.Attack_Attacker");
    let resident = format!("{SEEDLING}Physical.Resident_Resident");
    let place = format!("{SEEDLING}Physical.Resident_Place");
    let edges = vec![
        (C.to_string(), attacker, OTHER.to_string(), 0.9),
        (REL.to_string(), resident, C.to_string(), 0.5),
        (REL.to_string(), place, PARIS.to_string(), 0.75),
    ];
    let forward = edges.clone();
    let backward = edges;

    ScriptedQueryService::new()
        .on_ask(queries::CLUSTER_EXISTS, |q| {
            [C, REL, PARIS, OTHER].contains(&bound(q, "cluster").as_str())
        })
        .on_select(queries::CLUSTER_PROTOTYPE, |q| {
            let cluster = bound(q, "cluster");
            let coarse = if cluster == REL {
                Category::Relation
            } else {
                Category::Entity
            };
            let proto = if cluster == C {
                P.to_string()
            } else {
                cluster.trim_end_matches("-cluster").to_string()
            };
            vec![Row::new()
                .with("prototype", Term::iri(proto))
                .with("type", Term::iri(coarse.iri()))]
        })
        .on_select(queries::CLUSTER_SIZE, |q| {
            let n = if bound(q, "cluster") == C { 3 } else { 1 };
            vec![Row::new().with("size", Term::integer(n))]
        })
        .on_select(queries::CLUSTER_MEMBERS, |q| {
            if bound(q, "cluster") != C {
                return Vec::new();
            }
            (1..=3)
                .map(|i| {
                    Row::new()
                        .with("member", Term::iri(member(i)))
                        .with("mlabel", Term::literal(format!("Obama {i}")))
                        .with("type", Term::iri(format!("{SEEDLING}Person")))
                        .with("target", Term::literal("LDC2015E42:m.02mjmr"))
                })
                .collect()
        })
        .on_select(queries::CLUSTER_FORWARD, move |q| {
            let s = bound(q, "s");
            forward
                .iter()
                .filter(|e| e.0 == s)
                .map(|e| statement(&e.0, &e.1, &e.2, e.3))
                .collect()
        })
        .on_select(queries::CLUSTER_BACKWARD, move |q| {
            let o = bound(q, "o");
            backward
                .iter()
                .filter(|e| e.2 == o)
                .map(|e| statement(&e.0, &e.1, &e.2, e.3))
                .collect()
        })
        .on_select(queries::MEMBER_CLUSTER, |q| {
            if bound(q, "member") == member(9) {
                vec![Row::new().with("cluster", Term::iri(OTHER))]
            } else {
                Vec::new()
            }
        })
}

fn model(svc: Arc<ScriptedQueryService>) -> ClusterModel {
    ClusterModel::new(svc, Scope::new("eval", None), Arc::new(SummaryCache::empty()))
}

// ============================================================================
// Cluster materialization
// ============================================================================

#[test]
fn test_cluster_label_size_and_forward_edges() {
    let svc = Arc::new(store());
    let model = model(svc.clone());

    let cluster = model
        .get_cluster(C)
        .expect("ask should succeed")
        .expect("cluster should exist");
    assert_eq!(cluster.href(), "/cluster/entities/eval/obama-cluster");

    // Absent prototype label falls back to the category's short name.
    assert_eq!(cluster.label().unwrap(), Category::Entity.short_name());
    assert_eq!(cluster.category().unwrap(), Some(Category::Entity));

    // Size comes from the count-only query; members stay unmaterialized.
    assert_eq!(cluster.size().unwrap(), 3);
    assert_eq!(svc.count(queries::CLUSTER_SIZE), 1);
    assert_eq!(svc.count(queries::CLUSTER_MEMBERS), 0);

    let forward = cluster.forward().unwrap();
    assert_eq!(forward.len(), 1);
    let edge = forward.iter().next().unwrap();
    assert_eq!(edge.object, OTHER);
    assert_eq!(edge.count, 5);

    // Once materialized, size agrees with the member list.
    assert_eq!(cluster.members().unwrap().len(), 3);
    assert_eq!(cluster.size().unwrap(), 3);
}

#[test]
fn test_unknown_cluster_is_not_found() {
    let model = model(Arc::new(store()));
    assert!(model
        .get_cluster("http://www.isi.edu/gaia/entities/nope")
        .unwrap()
        .is_none());
}

#[test]
fn test_lazy_fields_are_fetched_once() {
    let svc = Arc::new(store());
    let model = model(svc.clone());
    let cluster = model.cluster_unchecked(C);
    for _ in 0..3 {
        cluster.prototype().unwrap();
        cluster.members().unwrap();
        cluster.backward().unwrap();
    }
    assert_eq!(svc.count(queries::CLUSTER_PROTOTYPE), 1);
    assert_eq!(svc.count(queries::CLUSTER_MEMBERS), 1);
    assert_eq!(svc.count(queries::CLUSTER_BACKWARD), 1);
}

// ============================================================================
// Ground truth
// ============================================================================

#[test]
fn test_groundtruth_partitions_members() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("eval.jl"),
        format!(
            "{}\n{}\n",
            serde_json::json!([member(7)]),
            serde_json::json!([member(1), member(2), member(9)])
        ),
    )
    .unwrap();

    let model = model(Arc::new(store()));
    let cluster = model.cluster_unchecked(C);
    let source = FileGroundTruth::new(dir.path());
    let status = cluster.groundtruth(&source).unwrap();
    let gt = status.found().expect("reference cluster");

    assert_eq!(gt.hit.len(), 2);
    assert!(gt.miss.contains(&member(3)));
    assert_eq!(gt.missing.get(&member(9)), Some(&Some(OTHER.to_string())));
}

#[test]
fn test_groundtruth_not_configured() {
    let dir = tempdir().unwrap();
    let model = model(Arc::new(store()));
    let status = model
        .cluster_unchecked(C)
        .groundtruth(&FileGroundTruth::new(dir.path()))
        .unwrap()
        .clone();
    assert_eq!(status, GroundTruthStatus::NotConfigured);
}

// ============================================================================
// Neighborhood → layout
// ============================================================================

#[test]
fn test_hop_one_neighborhood_flattens_relation_hubs() {
    let model = model(Arc::new(store()));
    let expander = NeighborhoodExpander::new(&model);
    let origin = model.cluster_unchecked(C);

    let n = expander
        .neighborhood(C, NeighborhoodOptions::default())
        .unwrap();

    for edge in origin.forward().unwrap().iter().chain(origin.backward().unwrap()) {
        assert!(n.edges.contains(edge));
    }
    assert!(n.edges.contains(&SuperEdge::new(
        REL,
        format!("{SEEDLING}Physical.Resident_Place"),
        PARIS,
        0
    )));
    assert_eq!(n.edges.len(), 3);
    assert!(n.nodes.contains(PARIS));
}

#[test]
fn test_layout_renders_dot_for_neighborhood() {
    let model = model(Arc::new(store()));
    let expander = NeighborhoodExpander::new(&model);
    let n = expander
        .neighborhood(C, NeighborhoodOptions::default())
        .unwrap();
    let graph = GraphLayoutBuilder::new().build(&n, &expander).unwrap();

    assert_eq!(graph.name, "obama-cluster");
    assert_eq!(graph.nodes.len(), 4);
    let hub = graph.nodes.iter().find(|node| node.id == REL).unwrap();
    assert!(hub.label.is_empty());
    let origin = graph.nodes.iter().find(|node| node.id == C).unwrap();
    assert_eq!(origin.label, vec!["Entity (×3)"]);

    let dot = graph.to_dot();
    assert!(dot.starts_with("digraph G {\n  node[style=\"filled\"]"));
    assert!(dot.contains(&format!("\"{C}\" -> \"{OTHER}\" [label=\"Attacker (×5)\"")));
}

// ============================================================================
// On-disk caches
// ============================================================================

#[test]
fn test_summary_cache_feeds_labels_and_sizes() {
    let dir = tempdir().unwrap();
    let svc = Arc::new(
        ScriptedQueryService::new()
            .on_select(queries::SUMMARY_SIZES, |_| {
                vec![Row::new()
                    .with("cluster", Term::iri(C))
                    .with("size", Term::integer(42))]
            })
            .on_select(queries::SUMMARY_LABELS, |_| {
                vec![Row::new()
                    .with("cluster", Term::iri(C))
                    .with("mlabel", Term::literal("Barack Obama"))
                    .with("type", Term::iri(format!("{SEEDLING}Person")))
                    .with("coarse", Term::iri(Category::Entity.iri()))]
            }),
    );
    let caches = SummaryCaches::new(dir.path());
    let model =
        ClusterModel::open(svc.clone(), Scope::new("eval", None), &caches).expect("open model");
    let cluster = model.cluster_unchecked(C);

    assert_eq!(cluster.label().unwrap(), "Barack Obama");
    assert_eq!(cluster.size().unwrap(), 42);
    assert_eq!(svc.count(queries::CLUSTER_PROTOTYPE), 0);
    assert_eq!(svc.count(queries::CLUSTER_SIZE), 0);
    assert_eq!(
        model.summaries().get(C).and_then(|e| e.category),
        Some(Category::Entity)
    );
    assert!(dir.path().join("eval.json").is_file());
}

#[test]
fn test_debug_overlay_replaces_live_link_targets() {
    let dir = tempdir().unwrap();
    let record = serde_json::json!({
        "type": "Person",
        "all_records": {
            "http://www.isi.edu/gaia/entities/obama": {},
            member(1): {"link_candidates": [{"target": "LDC2015E42:m.0overlay", "score": 0.9}]}
        },
        "attractive_records": []
    });
    fs::write(dir.path().join("eval.jl"), record.to_string()).unwrap();

    let svc = Arc::new(store());
    let model = model(svc.clone()).with_debug(Arc::new(DebugStore::new(dir.path())));
    assert!(model.has_debug());

    let cluster = model.cluster_unchecked(C);
    let info = cluster.debug_info().unwrap().expect("overlay record");
    assert_eq!(info.record_type(), Some("Person"));

    let members = cluster.members().unwrap();
    assert_eq!(
        members[0].link_targets().unwrap()[0].target,
        "LDC2015E42:m.0overlay"
    );
    assert!(members[1].link_targets().unwrap().is_empty());
    let issued = svc
        .executed()
        .into_iter()
        .find(|q| q.name() == queries::CLUSTER_MEMBERS)
        .unwrap();
    assert!(!issued.text().contains("?targetConf"));
}
