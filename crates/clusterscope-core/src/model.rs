//! Entry point bound to one repository and optional named graph.

use clusterscope_sparql::{QueryService, Row, SharedQueryService};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::cluster::Cluster;
use crate::debug::{DebugInfo, DebugStore};
use crate::document::{is_pronominal, JustifiedMention, RecoveredDocument};
use crate::member::ClusterMember;
use crate::namespace::{display_path, Category, Scope};
use crate::queries;
use crate::summary_cache::{SummaryCache, SummaryCaches};
use crate::Result;

/// Ordering of [`ClusterModel::list_clusters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Descending member count.
    #[default]
    Size,
    /// Ascending category label, then descending member count.
    Type,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "size" => Ok(SortBy::Size),
            "type" => Ok(SortBy::Type),
            other => Err(format!("unknown sort order `{other}` (expected size|type)")),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortBy::Size => "size",
            SortBy::Type => "type",
        })
    }
}

/// One entry of a cluster listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub uri: String,
    pub href: String,
    pub label: Option<String>,
    pub count: u64,
}

/// Lazy sequence of [`ClusterSummary`] over the rows of a listing query.
pub struct ClusterSummaries {
    rows: std::vec::IntoIter<Row>,
    scope: Scope,
}

impl Iterator for ClusterSummaries {
    type Item = ClusterSummary;

    fn next(&mut self) -> Option<Self::Item> {
        for row in self.rows.by_ref() {
            let Some(uri) = row.non_empty("cluster") else {
                continue;
            };
            let label = row
                .get("label")
                .map(|t| t.display_text().to_string())
                .filter(|l| !l.trim().is_empty());
            let count = match row.count("memberN") {
                Ok(n) => n.unwrap_or(0),
                Err(err) => {
                    tracing::warn!(cluster = %uri, error = %err, "malformed member count");
                    0
                }
            };
            return Some(ClusterSummary {
                href: display_path(&uri, &self.scope),
                uri,
                label,
                count,
            });
        }
        None
    }
}

pub struct ClusterModel {
    service: SharedQueryService,
    scope: Scope,
    summaries: Arc<SummaryCache>,
    debug: Option<Arc<DebugStore>>,
}

impl ClusterModel {
    pub fn new(service: SharedQueryService, scope: Scope, summaries: Arc<SummaryCache>) -> Self {
        Self {
            service,
            scope,
            summaries,
            debug: None,
        }
    }

    /// Bind to `scope`, building the scope's summary cache first if needed.
    pub fn open(service: SharedQueryService, scope: Scope, caches: &SummaryCaches) -> Result<Self> {
        let summaries = caches.get_or_build(service.as_ref(), &scope)?;
        Ok(Self::new(service, scope, summaries))
    }

    pub fn with_debug(mut self, store: Arc<DebugStore>) -> Self {
        self.debug = Some(store);
        self
    }

    pub fn service(&self) -> &dyn QueryService {
        self.service.as_ref()
    }

    pub fn shared_service(&self) -> &SharedQueryService {
        &self.service
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn summaries(&self) -> &SummaryCache {
        &self.summaries
    }

    pub fn has_debug(&self) -> bool {
        self.debug
            .as_ref()
            .is_some_and(|store| store.has_debug(&self.scope))
    }

    pub(crate) fn debug_info(&self, cluster_uri: &str) -> Result<Option<DebugInfo>> {
        match &self.debug {
            Some(store) => store.for_cluster(&self.scope, cluster_uri),
            None => Ok(None),
        }
    }

    /// Cluster handle after an existence check; `Ok(None)` when `uri` is not
    /// a same-as cluster in this scope.
    pub fn get_cluster(&self, uri: &str) -> Result<Option<Cluster<'_>>> {
        let exists = self.service.ask(&queries::cluster_exists(&self.scope, uri))?;
        tracing::debug!(cluster = uri, exists, "cluster lookup");
        Ok(exists.then(|| Cluster::new(self, uri)))
    }

    /// Cluster handle without the existence check, for URIs known to be
    /// clusters (edge endpoints, listing rows).
    pub fn cluster_unchecked(&self, uri: &str) -> Cluster<'_> {
        Cluster::new(self, uri)
    }

    pub fn member(&self, uri: &str) -> ClusterMember<'_> {
        ClusterMember::new(self, uri)
    }

    pub fn list_clusters(
        &self,
        category: Category,
        limit: Option<usize>,
        offset: usize,
        sort: SortBy,
    ) -> Result<ClusterSummaries> {
        let query = queries::list_clusters(&self.scope, category, sort, limit, offset);
        let rows = self.service.select(&query)?;
        tracing::debug!(%category, rows = rows.len(), "listed clusters");
        Ok(ClusterSummaries {
            rows: rows.into_iter(),
            scope: self.scope.clone(),
        })
    }

    pub fn href(&self, uri: &str) -> String {
        display_path(uri, &self.scope)
    }

    /// Rebuild a source document from the text justifications that cite it.
    /// Rows with unreadable offsets are skipped.
    pub fn recover_document(&self, doc_id: &str) -> Result<RecoveredDocument> {
        let query = queries::document_justifications(&self.scope, doc_id);
        let mut mentions = Vec::new();
        for row in self.service.select(&query)? {
            let Some(label) = row.get("label").map(|t| t.display_text().to_string()) else {
                continue;
            };
            let offsets = row
                .parse::<i64>("start", "offset")
                .and_then(|start| Ok((start, row.parse::<i64>("end", "offset")?)));
            let (start, end) = match offsets {
                Ok((Some(start), Some(end))) => (start, end),
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(doc = doc_id, error = %err, "skipping justification");
                    continue;
                }
            };
            let pronominal = row
                .get("kind")
                .is_some_and(|kind| is_pronominal(kind.display_text()));
            mentions.push(JustifiedMention {
                label,
                start,
                end,
                pronominal,
            });
        }
        tracing::debug!(doc = doc_id, mentions = mentions.len(), "recovered document");
        Ok(RecoveredDocument::new(doc_id, mentions))
    }
}
