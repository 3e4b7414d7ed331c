//! Bounded subgraphs around a cluster.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use crate::cluster::Cluster;
use crate::edge::SuperEdge;
use crate::layout::{NodeInfo, NodeInfoSource};
use crate::model::ClusterModel;
use crate::namespace::Category;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborhoodOptions {
    pub hops: usize,
    /// Stop after this many edges and mark the result truncated.
    pub max_edges: Option<usize>,
}

impl Default for NeighborhoodOptions {
    fn default() -> Self {
        Self {
            hops: 1,
            max_edges: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Neighborhood {
    pub origin: String,
    pub hops: usize,
    /// Edge endpoints plus the origin.
    pub nodes: BTreeSet<String>,
    pub edges: HashSet<SuperEdge>,
    pub truncated: bool,
}

impl Neighborhood {
    /// Edges in `(subject, predicate, object)` order.
    pub fn sorted_edges(&self) -> Vec<&SuperEdge> {
        let mut edges: Vec<&SuperEdge> = self.edges.iter().collect();
        edges.sort_by(|a, b| a.cmp_key(b));
        edges
    }
}

type EdgeSet = Rc<HashSet<SuperEdge>>;

/// Expands neighborhoods for one request, sharing cluster handles and
/// per-`(cluster, hops)` results across calls.
pub struct NeighborhoodExpander<'m> {
    model: &'m ClusterModel,
    clusters: RefCell<HashMap<String, Rc<Cluster<'m>>>>,
    memo: RefCell<HashMap<(String, usize), EdgeSet>>,
}

impl<'m> NeighborhoodExpander<'m> {
    pub fn new(model: &'m ClusterModel) -> Self {
        Self {
            model,
            clusters: RefCell::new(HashMap::new()),
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn model(&self) -> &'m ClusterModel {
        self.model
    }

    /// Shared handle for `uri`, created without an existence check.
    pub fn cluster(&self, uri: &str) -> Rc<Cluster<'m>> {
        if let Some(c) = self.clusters.borrow().get(uri) {
            return c.clone();
        }
        let cluster = Rc::new(self.model.cluster_unchecked(uri));
        self.clusters
            .borrow_mut()
            .insert(uri.to_string(), cluster.clone());
        cluster
    }

    /// Whether `uri`'s prototype is a relation. A cluster without a
    /// prototype is treated as a non-relation.
    fn is_relation(&self, uri: &str) -> Result<bool> {
        match self.cluster(uri).category() {
            Ok(category) => Ok(category == Some(Category::Relation)),
            Err(Error::MissingPrototype { cluster }) => {
                tracing::warn!(%cluster, "no prototype; treating as non-relation");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn direct_edges(&self, uri: &str) -> Result<HashSet<SuperEdge>> {
        let cluster = self.cluster(uri);
        let mut edges = cluster.forward()?.clone();
        for edge in sorted(cluster.backward()?) {
            if !edges.contains(edge) {
                edges.insert(edge.clone());
            }
        }
        Ok(edges)
    }

    fn expand(&self, uri: &str, hops: usize) -> Result<EdgeSet> {
        let key = (uri.to_string(), hops);
        if let Some(done) = self.memo.borrow().get(&key) {
            return Ok(done.clone());
        }

        let direct = self.direct_edges(uri)?;
        let edges = if hops > 1 {
            let mut out = HashSet::new();
            for edge in sorted(&direct) {
                for end in [&edge.subject, &edge.object] {
                    let inner = self.expand(end, hops - 1)?;
                    extend_first_wins(&mut out, &inner);
                }
            }
            out
        } else if hops == 1 && !self.is_relation(uri)? {
            let mut out = direct.clone();
            for edge in sorted(&direct) {
                if edge.subject != uri && self.is_relation(&edge.subject)? {
                    let hub = self.direct_edges(&edge.subject)?;
                    extend_first_wins(&mut out, &hub);
                }
            }
            out
        } else {
            direct
        };

        tracing::debug!(cluster = uri, hops, edges = edges.len(), "expanded neighborhood");
        let edges = Rc::new(edges);
        self.memo.borrow_mut().insert(key, edges.clone());
        Ok(edges)
    }

    pub fn neighborhood(&self, origin: &str, options: NeighborhoodOptions) -> Result<Neighborhood> {
        let expanded = self.expand(origin, options.hops)?;
        let mut edges: Vec<&SuperEdge> = sorted(&expanded);
        let truncated = match options.max_edges {
            Some(max) if edges.len() > max => {
                edges.truncate(max);
                true
            }
            _ => false,
        };
        let mut nodes = BTreeSet::new();
        nodes.insert(origin.to_string());
        for edge in &edges {
            nodes.insert(edge.subject.clone());
            nodes.insert(edge.object.clone());
        }
        if truncated {
            tracing::warn!(cluster = origin, max = ?options.max_edges, "neighborhood truncated");
        }
        Ok(Neighborhood {
            origin: origin.to_string(),
            hops: options.hops,
            nodes,
            edges: edges.into_iter().cloned().collect(),
            truncated,
        })
    }
}

impl NodeInfoSource for NeighborhoodExpander<'_> {
    /// Summary cache first, then the live cluster.
    fn node_info(&self, uri: &str) -> Result<NodeInfo> {
        let summaries = self.model.summaries();
        if let Some(entry) = summaries.get(uri) {
            if let (Some(label), Some(count)) = (&entry.label, entry.size) {
                let relation = match entry.category {
                    Some(category) => category == Category::Relation,
                    None => self.is_relation(uri)?,
                };
                return Ok(NodeInfo {
                    label: label.clone(),
                    count,
                    type_iri: entry.type_iri.clone(),
                    relation,
                });
            }
        }
        tracing::debug!(cluster = uri, "summary cache miss; using live cluster");
        let cluster = self.cluster(uri);
        Ok(NodeInfo {
            label: cluster.label()?.to_string(),
            count: cluster.size()?,
            type_iri: cluster.type_iri()?.map(str::to_string),
            relation: self.is_relation(uri)?,
        })
    }
}

fn sorted(edges: &HashSet<SuperEdge>) -> Vec<&SuperEdge> {
    let mut out: Vec<&SuperEdge> = edges.iter().collect();
    out.sort_by(|a, b| a.cmp_key(b));
    out
}

fn extend_first_wins(into: &mut HashSet<SuperEdge>, from: &HashSet<SuperEdge>) {
    for edge in sorted(from) {
        if !into.contains(edge) {
            into.insert(edge.clone());
        }
    }
}
