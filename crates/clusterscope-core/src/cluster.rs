//! Lazily populated same-as clusters.

use clusterscope_sparql::Row;
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::debug::DebugInfo;
use crate::edge::{count_from_confidence, SuperEdge};
use crate::groundtruth::{GroundTruthComparer, GroundTruthSource, GroundTruthStatus};
use crate::linking::{normalize_link_target, ExternalLinkLookup, ExternalNode};
use crate::member::{merge_label_counts, ClusterMember, LinkTarget};
use crate::model::ClusterModel;
use crate::namespace::Category;
use crate::queries::{self, Direction};
use crate::{Error, Result};

/// One same-as cluster.
///
/// Identity is the URI; every other property is fetched from the query
/// service on first access and cached for the lifetime of the value.
pub struct Cluster<'m> {
    model: &'m ClusterModel,
    uri: String,
    prototype: OnceCell<ClusterMember<'m>>,
    members: OnceCell<Vec<ClusterMember<'m>>>,
    size: OnceCell<u64>,
    forward: OnceCell<HashSet<SuperEdge>>,
    backward: OnceCell<HashSet<SuperEdge>>,
    groundtruth: OnceCell<GroundTruthStatus>,
    debug_info: OnceCell<Option<DebugInfo>>,
    all_labels: OnceCell<Vec<(String, u64)>>,
}

impl<'m> Cluster<'m> {
    pub(crate) fn new(model: &'m ClusterModel, uri: impl Into<String>) -> Self {
        Self {
            model,
            uri: uri.into(),
            prototype: OnceCell::new(),
            members: OnceCell::new(),
            size: OnceCell::new(),
            forward: OnceCell::new(),
            backward: OnceCell::new(),
            groundtruth: OnceCell::new(),
            debug_info: OnceCell::new(),
            all_labels: OnceCell::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn model(&self) -> &'m ClusterModel {
        self.model
    }

    pub fn href(&self) -> String {
        self.model.href(&self.uri)
    }

    pub fn prototype(&self) -> Result<&ClusterMember<'m>> {
        if let Some(p) = self.prototype.get() {
            return Ok(p);
        }
        let query = queries::cluster_prototype(self.model.scope(), &self.uri);
        let rows = self.model.service().select(&query)?;
        let row = rows
            .iter()
            .find(|r| coarse_category(r).is_some())
            .or_else(|| rows.first())
            .ok_or_else(|| Error::MissingPrototype {
                cluster: self.uri.clone(),
            })?;
        let Some(uri) = row.non_empty("prototype") else {
            return Err(Error::MissingPrototype {
                cluster: self.uri.clone(),
            });
        };
        let kind = coarse_category(row);
        let fine_type = row.non_empty("category");
        let label = row.non_empty("mlabel").or_else(|| {
            fine_type
                .as_deref()
                .or(row.text("type"))
                .map(|t| clusterscope_sparql::local_name(t).to_string())
        });
        let prototype = ClusterMember::new(self.model, uri)
            .with_kind(kind)
            .with_details(label, fine_type.or_else(|| row.non_empty("type")));
        tracing::debug!(cluster = %self.uri, prototype = %prototype.uri(), "resolved prototype");
        Ok(self.prototype.get_or_init(|| prototype))
    }

    /// Coarse category of the prototype.
    pub fn category(&self) -> Result<Option<Category>> {
        Ok(self.prototype()?.kind())
    }

    pub fn label(&self) -> Result<&str> {
        if let Some(label) = self.model.summaries().label(&self.uri) {
            return Ok(label);
        }
        self.prototype()?.label()
    }

    /// Fine-grained type IRI of the prototype.
    pub fn type_iri(&self) -> Result<Option<&str>> {
        if let Some(t) = self.model.summaries().type_iri(&self.uri) {
            return Ok(Some(t));
        }
        self.prototype()?.type_iri()
    }

    pub fn debug_info(&self) -> Result<Option<&DebugInfo>> {
        if let Some(info) = self.debug_info.get() {
            return Ok(info.as_ref());
        }
        let info = self.model.debug_info(&self.uri)?;
        Ok(self.debug_info.get_or_init(|| info).as_ref())
    }

    /// Members excluding the prototype, ordered by URI.
    ///
    /// With a debug overlay the link targets come from the overlay's
    /// candidates instead of the live query.
    pub fn members(&self) -> Result<&[ClusterMember<'m>]> {
        if let Some(members) = self.members.get() {
            return Ok(members);
        }
        let debug = self.debug_info()?;
        let query = queries::cluster_members(self.model.scope(), &self.uri, debug.is_none());
        let rows = self.model.service().select(&query)?;

        let mut grouped: BTreeMap<String, (Option<String>, Option<String>, Vec<LinkTarget>)> =
            BTreeMap::new();
        for row in &rows {
            let Some(member) = row.non_empty("member") else {
                continue;
            };
            let entry = grouped.entry(member).or_default();
            if entry.0.is_none() {
                entry.0 = row.non_empty("mlabel");
            }
            if entry.1.is_none() {
                entry.1 = row.non_empty("type");
            }
            if let Some(target) = row.non_empty("target") {
                let confidence = match row.parse::<f64>("targetConf", "decimal") {
                    Ok(c) => c,
                    Err(err) => {
                        tracing::warn!(cluster = %self.uri, error = %err, "ignoring link confidence");
                        None
                    }
                };
                if !entry.2.iter().any(|t| t.target == target) {
                    entry.2.push(LinkTarget { target, confidence });
                }
            }
        }

        let members: Vec<ClusterMember<'m>> = grouped
            .into_iter()
            .map(|(uri, (label, type_iri, live_targets))| {
                let targets = match debug {
                    Some(info) => info
                        .link_candidates(&uri)
                        .into_iter()
                        .map(|c| LinkTarget {
                            target: c.target,
                            confidence: c.score,
                        })
                        .collect(),
                    None => live_targets,
                };
                ClusterMember::new(self.model, uri)
                    .with_details(label, type_iri)
                    .with_link_targets(targets)
            })
            .collect();
        tracing::debug!(cluster = %self.uri, members = members.len(), "materialized members");
        Ok(self.members.get_or_init(|| members))
    }

    /// Member count. Uses materialized members, then the summary cache, then
    /// a count-only query; never materializes members itself.
    pub fn size(&self) -> Result<u64> {
        if let Some(members) = self.members.get() {
            return Ok(members.len() as u64);
        }
        if let Some(size) = self.model.summaries().size(&self.uri) {
            return Ok(size);
        }
        if let Some(size) = self.size.get() {
            return Ok(*size);
        }
        let query = queries::cluster_size(self.model.scope(), &self.uri);
        let rows = self.model.service().select(&query)?;
        let size = match rows.first().map(|r| r.count("size")).transpose() {
            Ok(n) => n.flatten().unwrap_or(0),
            Err(err) => {
                tracing::warn!(cluster = %self.uri, error = %err, "malformed cluster size");
                0
            }
        };
        Ok(*self.size.get_or_init(|| size))
    }

    fn edges(&self, direction: Direction) -> Result<HashSet<SuperEdge>> {
        let query = queries::super_edges(self.model.scope(), &self.uri, direction);
        let mut edges = HashSet::new();
        for row in self.model.service().select(&query)? {
            if let Some(edge) = self.edge_from_row(&row, direction) {
                edges.insert(edge);
            }
        }
        tracing::debug!(cluster = %self.uri, ?direction, edges = edges.len(), "aggregated super edges");
        Ok(edges)
    }

    fn edge_from_row(&self, row: &Row, direction: Direction) -> Option<SuperEdge> {
        let bound = |var: &str| row.non_empty(var).or_else(|| Some(self.uri.clone()));
        let (subject, object) = match direction {
            Direction::Forward => (bound("s")?, row.non_empty("o")?),
            Direction::Backward => (row.non_empty("s")?, bound("o")?),
        };
        let predicate = row.non_empty("p")?;
        let confidence = match row.parse::<f64>("conf", "decimal") {
            Ok(c) => c.unwrap_or(0.0),
            Err(err) => {
                tracing::warn!(cluster = %self.uri, error = %err, "skipping statement with malformed confidence");
                return None;
            }
        };
        Some(SuperEdge::new(
            subject,
            predicate,
            object,
            count_from_confidence(confidence),
        ))
    }

    /// Edges with this cluster as subject.
    pub fn forward(&self) -> Result<&HashSet<SuperEdge>> {
        if let Some(edges) = self.forward.get() {
            return Ok(edges);
        }
        let edges = self.edges(Direction::Forward)?;
        Ok(self.forward.get_or_init(|| edges))
    }

    /// Edges with this cluster as object.
    pub fn backward(&self) -> Result<&HashSet<SuperEdge>> {
        if let Some(edges) = self.backward.get() {
            return Ok(edges);
        }
        let edges = self.edges(Direction::Backward)?;
        Ok(self.backward.get_or_init(|| edges))
    }

    /// Link target -> number of members linked to it, most common first.
    pub fn link_targets(&self) -> Result<Vec<(String, u64)>> {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for member in self.members()? {
            for target in member.link_targets()? {
                *counts.entry(target.target.as_str()).or_default() += 1;
            }
        }
        let mut out: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(t, n)| (t.to_string(), n))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }

    /// Knowledge-base nodes behind the members' link targets, with the
    /// number of members pointing at each.
    pub fn qnodes(&self, lookup: &dyn ExternalLinkLookup) -> Result<Vec<(ExternalNode, u64)>> {
        let mut nodes: Vec<(ExternalNode, u64)> = Vec::new();
        for (target, count) in self.link_targets()? {
            let Some(id) = normalize_link_target(&target) else {
                continue;
            };
            let Some(node) = lookup.lookup(&id)? else {
                continue;
            };
            match nodes.iter_mut().find(|(n, _)| n.id == node.id) {
                Some((_, n)) => *n += count,
                None => nodes.push((node, count)),
            }
        }
        nodes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        Ok(nodes)
    }

    /// Sum of every member's aggregated labels, most common first.
    pub fn all_labels(&self) -> Result<&[(String, u64)]> {
        if let Some(labels) = self.all_labels.get() {
            return Ok(labels);
        }
        let mut counts = Vec::new();
        for member in self.members()? {
            counts.extend(member.all_labels()?.iter().cloned());
        }
        let merged = merge_label_counts(counts);
        Ok(self.all_labels.get_or_init(|| merged))
    }

    /// Comparison against the reference clustering, computed once.
    pub fn groundtruth(&self, source: &dyn GroundTruthSource) -> Result<&GroundTruthStatus> {
        if let Some(status) = self.groundtruth.get() {
            return Ok(status);
        }
        let status = GroundTruthComparer::new(source).compare(self)?;
        Ok(self.groundtruth.get_or_init(|| status))
    }
}

fn coarse_category(row: &Row) -> Option<Category> {
    row.text("type").and_then(Category::from_iri)
}

impl std::fmt::Debug for Cluster<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("uri", &self.uri)
            .field("prototype", &self.prototype.get())
            .field("members", &self.members.get().map(Vec::len))
            .finish_non_exhaustive()
    }
}
