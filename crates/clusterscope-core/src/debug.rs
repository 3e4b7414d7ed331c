//! Debug overlays explaining automatic link resolution.
//!
//! One JSON-lines file per (repository, named graph) under the debug
//! directory. Each line describes one clustered entity:
//!
//! ```json
//! {"type": "...", "all_records": {"<member uri>": {...}}, "attractive_records": ...}
//! ```
//!
//! A member record may list `link_candidates` (`{"target", "score", ...}`);
//! when an overlay exists those candidates replace the live link query.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::namespace::Scope;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DebugRecord {
    #[serde(default, rename = "type")]
    pub record_type: Option<String>,
    #[serde(default)]
    pub all_records: BTreeMap<String, Value>,
    #[serde(default)]
    pub attractive_records: Value,
}

/// One link candidate with whatever statistics the resolver recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub target: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub stats: BTreeMap<String, Value>,
}

/// Immutable view of the debug record covering one cluster.
#[derive(Debug, Clone)]
pub struct DebugInfo {
    record: Arc<DebugRecord>,
}

impl DebugInfo {
    pub fn new(record: DebugRecord) -> Self {
        Self {
            record: Arc::new(record),
        }
    }

    pub fn members(&self) -> &BTreeMap<String, Value> {
        &self.record.all_records
    }

    pub fn member(&self, uri: &str) -> Option<&Value> {
        self.record.all_records.get(uri)
    }

    /// Pretty, key-sorted JSON for one member record.
    pub fn print_member(&self, uri: &str) -> Option<String> {
        self.member(uri)
            .and_then(|v| serde_json::to_string_pretty(v).ok())
    }

    pub fn attractives(&self) -> &Value {
        &self.record.attractive_records
    }

    pub fn record_type(&self) -> Option<&str> {
        self.record.record_type.as_deref()
    }

    /// Link candidates recorded for a member, best score first. Entries that
    /// do not parse are skipped.
    pub fn link_candidates(&self, uri: &str) -> Vec<LinkCandidate> {
        let Some(list) = self
            .member(uri)
            .and_then(|m| m.get("link_candidates"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        let mut out: Vec<LinkCandidate> = list
            .iter()
            .filter_map(|c| match serde_json::from_value::<LinkCandidate>(c.clone()) {
                Ok(candidate) => Some(candidate),
                Err(err) => {
                    tracing::warn!(member = uri, error = %err, "skipping malformed link candidate");
                    None
                }
            })
            .collect();
        out.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .total_cmp(&a.score.unwrap_or(0.0))
                .then_with(|| a.target.cmp(&b.target))
        });
        out
    }
}

type Records = Arc<Vec<Arc<DebugRecord>>>;

/// Process-lifetime loader of debug overlay files.
pub struct DebugStore {
    dir: PathBuf,
    loaded: Mutex<HashMap<String, Records>>,
}

impl DebugStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, scope: &Scope) -> PathBuf {
        self.dir.join(format!("{}.jl", scope.file_id()))
    }

    pub fn has_debug(&self, scope: &Scope) -> bool {
        self.path_for(scope).is_file()
    }

    fn records(&self, scope: &Scope) -> Result<Option<Records>> {
        let key = scope.file_id();
        let mut loaded = self.loaded.lock();
        if let Some(records) = loaded.get(&key) {
            return Ok(Some(records.clone()));
        }
        let path = self.path_for(scope);
        if !path.is_file() {
            return Ok(None);
        }
        let records = Arc::new(read_json_lines(&path)?);
        loaded.insert(key, records.clone());
        Ok(Some(records))
    }

    /// Record whose `all_records` contains the cluster's entity (the cluster
    /// URI without its `-cluster` suffix).
    pub fn for_cluster(&self, scope: &Scope, cluster_uri: &str) -> Result<Option<DebugInfo>> {
        let Some(records) = self.records(scope)? else {
            return Ok(None);
        };
        let entity = cluster_uri.strip_suffix("-cluster").unwrap_or(cluster_uri);
        Ok(records
            .iter()
            .find(|r| r.all_records.contains_key(entity))
            .map(|r| DebugInfo { record: r.clone() }))
    }
}

fn read_json_lines(path: &Path) -> Result<Vec<Arc<DebugRecord>>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<DebugRecord>(line)
                .map(Arc::new)
                .map_err(|e| Error::json(path, e))
        })
        .collect()
}
