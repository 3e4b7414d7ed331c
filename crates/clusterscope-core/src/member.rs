//! Mention-level cluster members.

use clusterscope_sparql::local_name;
use serde::Serialize;
use std::cell::OnceCell;
use std::collections::HashMap;

use crate::cluster::Cluster;
use crate::linking::{normalize_link_target, ExternalLinkLookup, ExternalNode};
use crate::model::ClusterModel;
use crate::namespace::{predicate_label, short_id, Category};
use crate::queries;
use crate::source_context::{SourceContext, DEFAULT_CONTEXT_OFFSET};
use crate::Result;

/// External knowledge-base link of a member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkTarget {
    pub target: String,
    pub confidence: Option<f64>,
}

/// Character offsets of one justification; `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Span {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug)]
struct MemberDetails {
    label: String,
    type_iri: Option<String>,
}

#[derive(Debug, Default)]
struct Provenance {
    source: Option<String>,
    spans: Vec<Span>,
}

/// Display label when a member has no name: the type's local name, else the
/// member's short id.
pub(crate) fn fallback_label(uri: &str, type_iri: Option<&str>) -> String {
    type_iri
        .map(local_name)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| short_id(uri))
        .to_string()
}

/// Sum `(label, count)` pairs after collapsing runs of whitespace, most
/// common first.
pub(crate) fn merge_label_counts(
    counts: impl IntoIterator<Item = (String, u64)>,
) -> Vec<(String, u64)> {
    let mut merged: HashMap<String, u64> = HashMap::new();
    for (label, n) in counts {
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
        if label.is_empty() {
            continue;
        }
        *merged.entry(label).or_default() += n;
    }
    let mut out: Vec<(String, u64)> = merged.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// One member of a cluster. Fields are fetched on first access unless they
/// were supplied when the member was built from a cluster-level query.
pub struct ClusterMember<'m> {
    model: &'m ClusterModel,
    uri: String,
    kind: Option<Category>,
    details: OnceCell<MemberDetails>,
    link_targets: OnceCell<Vec<LinkTarget>>,
    provenance: OnceCell<Provenance>,
    all_labels: OnceCell<Vec<(String, u64)>>,
    cluster_uri: OnceCell<Option<String>>,
}

impl<'m> ClusterMember<'m> {
    pub(crate) fn new(model: &'m ClusterModel, uri: impl Into<String>) -> Self {
        Self {
            model,
            uri: uri.into(),
            kind: None,
            details: OnceCell::new(),
            link_targets: OnceCell::new(),
            provenance: OnceCell::new(),
            all_labels: OnceCell::new(),
            cluster_uri: OnceCell::new(),
        }
    }

    /// Preset label and type. A missing label falls back to the type.
    pub(crate) fn with_details(self, label: Option<String>, type_iri: Option<String>) -> Self {
        let label = label.unwrap_or_else(|| fallback_label(&self.uri, type_iri.as_deref()));
        let _ = self.details.set(MemberDetails { label, type_iri });
        self
    }

    pub(crate) fn with_kind(mut self, kind: Option<Category>) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn with_link_targets(self, targets: Vec<LinkTarget>) -> Self {
        let _ = self.link_targets.set(targets);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.uri)
    }

    /// Coarse category, known for prototypes.
    pub fn kind(&self) -> Option<Category> {
        self.kind
    }

    fn fetch_details(&self) -> Result<(MemberDetails, Vec<LinkTarget>)> {
        let query = queries::member_details(self.model.scope(), &self.uri);
        let rows = self.model.service().select(&query)?;
        let row = rows.first();
        let type_iri = row.and_then(|r| r.non_empty("type"));
        let label = row
            .and_then(|r| r.non_empty("label"))
            .unwrap_or_else(|| fallback_label(&self.uri, type_iri.as_deref()));
        let targets = row
            .and_then(|r| r.non_empty("target"))
            .map(|target| LinkTarget {
                target,
                confidence: None,
            })
            .into_iter()
            .collect();
        tracing::debug!(member = %self.uri, found = row.is_some(), "member details");
        Ok((MemberDetails { label, type_iri }, targets))
    }

    fn details(&self) -> Result<&MemberDetails> {
        if let Some(details) = self.details.get() {
            return Ok(details);
        }
        let (details, targets) = self.fetch_details()?;
        let _ = self.link_targets.set(targets);
        Ok(self.details.get_or_init(|| details))
    }

    pub fn label(&self) -> Result<&str> {
        Ok(&self.details()?.label)
    }

    /// Fine-grained type IRI.
    pub fn type_iri(&self) -> Result<Option<&str>> {
        Ok(self.details()?.type_iri.as_deref())
    }

    pub fn link_targets(&self) -> Result<&[LinkTarget]> {
        if let Some(targets) = self.link_targets.get() {
            return Ok(targets);
        }
        let (details, targets) = self.fetch_details()?;
        let _ = self.details.set(details);
        Ok(self.link_targets.get_or_init(|| targets))
    }

    fn provenance(&self) -> Result<&Provenance> {
        if let Some(p) = self.provenance.get() {
            return Ok(p);
        }
        let query = queries::member_justifications(self.model.scope(), &self.uri);
        let mut provenance = Provenance::default();
        for row in self.model.service().select(&query)? {
            if provenance.source.is_none() {
                provenance.source = row.non_empty("source");
            }
            let span = row
                .parse::<i64>("start", "offset")
                .and_then(|start| Ok((start, row.parse::<i64>("end", "offset")?)));
            match span {
                Ok((Some(start), Some(end))) => provenance.spans.push(Span { start, end }),
                Ok(_) => {}
                Err(err) => tracing::warn!(member = %self.uri, error = %err, "skipping justification"),
            }
        }
        provenance.spans.sort();
        provenance.spans.dedup();
        Ok(self.provenance.get_or_init(|| provenance))
    }

    /// Source document of the member's justifications.
    pub fn source(&self) -> Result<Option<&str>> {
        Ok(self.provenance()?.source.as_deref())
    }

    pub fn spans(&self) -> Result<&[Span]> {
        Ok(&self.provenance()?.spans)
    }

    /// Justification labels and names with their counts, most common first.
    pub fn all_labels(&self) -> Result<&[(String, u64)]> {
        if let Some(labels) = self.all_labels.get() {
            return Ok(labels);
        }
        let scope = self.model.scope();
        let mut counts = Vec::new();
        for query in [
            queries::member_justification_labels(scope, &self.uri),
            queries::member_names(scope, &self.uri),
        ] {
            for row in self.model.service().select(&query)? {
                let Some(label) = row.non_empty("label") else {
                    continue;
                };
                match row.count("n") {
                    Ok(n) => counts.push((label, n.unwrap_or(1))),
                    Err(err) => tracing::warn!(member = %self.uri, error = %err, "skipping label count"),
                }
            }
        }
        let merged = merge_label_counts(counts);
        Ok(self.all_labels.get_or_init(|| merged))
    }

    /// Knowledge-base node of the first resolvable link target.
    pub fn external_node(&self, lookup: &dyn ExternalLinkLookup) -> Result<Option<ExternalNode>> {
        for target in self.link_targets()? {
            if let Some(id) = normalize_link_target(&target.target) {
                return lookup.lookup(&id);
            }
        }
        Ok(None)
    }

    /// URI of the cluster that contains this member.
    pub fn cluster_uri(&self) -> Result<Option<&str>> {
        if let Some(uri) = self.cluster_uri.get() {
            return Ok(uri.as_deref());
        }
        let query = queries::member_cluster(self.model.scope(), &self.uri);
        let found = self
            .model
            .service()
            .select(&query)?
            .iter()
            .find_map(|r| r.non_empty("cluster"));
        Ok(self.cluster_uri.get_or_init(|| found).as_deref())
    }

    pub fn cluster(&self) -> Result<Option<Cluster<'m>>> {
        Ok(self
            .cluster_uri()?
            .map(|uri| self.model.cluster_unchecked(uri)))
    }

    /// Arguments of an event or relation mention as `(role, argument)`.
    pub fn roles(&self) -> Result<Vec<(String, ClusterMember<'m>)>> {
        let query = queries::member_roles(self.model.scope(), &self.uri);
        let rows = self.model.service().select(&query)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let pred = row.non_empty("pred")?;
                let obj = row.non_empty("obj")?;
                let argument = ClusterMember::new(self.model, obj)
                    .with_details(row.non_empty("objlabel"), row.non_empty("objtype"));
                Some((predicate_label(&pred).to_string(), argument))
            })
            .collect())
    }

    /// Events this mention takes part in, as `(role, event)`. The event's
    /// label is its most common justification label, else its type name.
    pub fn events_by_role(&self) -> Result<Vec<(String, ClusterMember<'m>)>> {
        let query = queries::member_events(self.model.scope(), &self.uri);
        let rows = self.model.service().select(&query)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let pred = row.non_empty("pred")?;
                let event = row.non_empty("event")?;
                let event = ClusterMember::new(self.model, event)
                    .with_details(row.non_empty("eventlabel"), row.non_empty("eventtype"))
                    .with_kind(Some(Category::Event));
                Some((predicate_label(&pred).to_string(), event))
            })
            .collect())
    }

    /// Text around each justification span; empty when the source document
    /// is unknown.
    pub fn mentions(&self, context: &SourceContext) -> Result<Vec<String>> {
        let Some(source) = self.source()? else {
            return Ok(Vec::new());
        };
        if !context.doc_exists(source) {
            return Ok(Vec::new());
        }
        Ok(self
            .spans()?
            .iter()
            .map(|s| context.context(source, s.start, s.end, DEFAULT_CONTEXT_OFFSET))
            .collect())
    }
}

impl std::fmt::Debug for ClusterMember<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterMember")
            .field("uri", &self.uri)
            .field("kind", &self.kind)
            .field("details", &self.details.get())
            .finish_non_exhaustive()
    }
}
