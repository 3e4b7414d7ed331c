//! Per-(repository, named graph) summary cache.
//!
//! A JSON file mapping cluster URI to precomputed
//! `{label, type, category, size}`. The
//! model only reads it; [`SummaryCacheBuilder`] produces it from the query
//! service the first time a scope is opened and the file is absent.

use clusterscope_sparql::{local_name, QueryService};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::namespace::{Category, Scope, SEEDLING};
use crate::queries;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Fine type of the prototype.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_iri: Option<String>,
    /// Coarse `rdf:type` of the prototype. Absent in caches written before
    /// it was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct SummaryCache {
    entries: BTreeMap<String, SummaryEntry>,
}

impl SummaryCache {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, SummaryEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let entries = serde_json::from_str(&text).map_err(|e| Error::json(path, e))?;
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let text = serde_json::to_string_pretty(&self.entries).map_err(|e| Error::json(path, e))?;
        fs::write(path, text).map_err(|e| Error::io(path, e))
    }

    pub fn get(&self, uri: &str) -> Option<&SummaryEntry> {
        self.entries.get(uri)
    }

    pub fn label(&self, uri: &str) -> Option<&str> {
        self.get(uri)?.label.as_deref()
    }

    pub fn type_iri(&self, uri: &str) -> Option<&str> {
        self.get(uri)?.type_iri.as_deref()
    }

    pub fn size(&self, uri: &str) -> Option<u64> {
        self.get(uri)?.size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fine types whose bare type name is replaced by the most frequent
/// justification label, with a one-letter marker.
static TYPED_LABEL_MARKERS: [(&str, &str); 8] = [
    ("Person", "[P]"),
    ("Time", "[T]"),
    ("Facility", "[F]"),
    ("Money", "[M]"),
    ("Location", "[L]"),
    ("Weapon", "[W]"),
    ("Organization", "[O]"),
    ("Vehicle", "[V]"),
];

/// Offline collaborator that computes a scope's summary cache.
pub struct SummaryCacheBuilder<'a> {
    service: &'a dyn QueryService,
    scope: &'a Scope,
}

impl<'a> SummaryCacheBuilder<'a> {
    pub fn new(service: &'a dyn QueryService, scope: &'a Scope) -> Self {
        Self { service, scope }
    }

    pub fn build(&self) -> Result<SummaryCache> {
        let mut entries: BTreeMap<String, SummaryEntry> = BTreeMap::new();

        for row in self.service.select(&queries::summary_sizes(self.scope))? {
            let Some(cluster) = row.non_empty("cluster") else {
                continue;
            };
            match row.count("size") {
                Ok(size) => entries.entry(cluster).or_default().size = size,
                Err(err) => tracing::warn!(%cluster, error = %err, "skipping malformed cluster size"),
            }
        }

        for row in self.service.select(&queries::summary_labels(self.scope))? {
            let Some(cluster) = row.non_empty("cluster") else {
                continue;
            };
            let entry = entries.entry(cluster).or_default();
            let type_iri = row.non_empty("type");
            let label = row
                .non_empty("mlabel")
                .or_else(|| type_iri.as_deref().map(|t| local_name(t).to_string()));
            if entry.type_iri.is_none() {
                entry.type_iri = type_iri;
            }
            if entry.category.is_none() {
                entry.category = row.non_empty("coarse").as_deref().and_then(Category::from_iri);
            }
            entry.label = match (entry.label.take(), label) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }

        self.refine_typed_labels(&mut entries)?;
        tracing::info!(
            scope = %self.scope.file_id(),
            clusters = entries.len(),
            "built summary cache"
        );
        Ok(SummaryCache::from_entries(entries))
    }

    fn refine_typed_labels(&self, entries: &mut BTreeMap<String, SummaryEntry>) -> Result<()> {
        for (uri, entry) in entries.iter_mut() {
            let (Some(label), Some(type_iri)) = (entry.label.as_deref(), entry.type_iri.as_deref())
            else {
                continue;
            };
            let Some(type_name) = type_iri.strip_prefix(SEEDLING) else {
                continue;
            };
            let Some((_, marker)) = TYPED_LABEL_MARKERS
                .iter()
                .find(|(t, _)| *t == type_name && label == type_name)
            else {
                continue;
            };
            let rows = self.service.select(&queries::summary_top_label(self.scope, uri))?;
            if let Some(top) = rows.first().and_then(|r| r.non_empty("lbl")) {
                entry.label = Some(format!("{marker}{top}"));
            }
        }
        Ok(())
    }
}

/// Process-lifetime registry of loaded summary caches, one per scope.
pub struct SummaryCaches {
    dir: PathBuf,
    loaded: Mutex<HashMap<String, Arc<SummaryCache>>>,
}

impl SummaryCaches {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, scope: &Scope) -> PathBuf {
        self.dir.join(format!("{}.json", scope.file_id()))
    }

    /// Cache for `scope`, building and persisting it first if the file is
    /// absent. The build is a blocking one-time cost per scope.
    pub fn get_or_build(&self, service: &dyn QueryService, scope: &Scope) -> Result<Arc<SummaryCache>> {
        let key = scope.file_id();
        let mut loaded = self.loaded.lock();
        if let Some(cache) = loaded.get(&key) {
            return Ok(cache.clone());
        }
        let path = self.path_for(scope);
        if !path.is_file() {
            tracing::info!(path = %path.display(), "summary cache missing; building");
            SummaryCacheBuilder::new(service, scope).build()?.save(&path)?;
        }
        let cache = Arc::new(SummaryCache::load(&path)?);
        loaded.insert(key, cache.clone());
        Ok(cache)
    }

    /// Drop the in-memory copy and the file so the next open rebuilds.
    pub fn invalidate(&self, scope: &Scope) -> Result<()> {
        self.loaded.lock().remove(&scope.file_id());
        let path = self.path_for(scope);
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }
}
