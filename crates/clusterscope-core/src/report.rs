//! Repository-wide statistics.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clusterscope_sparql::Query;

use crate::model::ClusterModel;
use crate::namespace::{Category, SEEDLING};
use crate::queries;
use crate::{Error, Result};

/// JSON object on disk, rewritten after every insert.
#[derive(Debug)]
pub struct ReportMemory {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl ReportMemory {
    /// Load `path`; with `refresh` (or when the file is absent) start empty.
    pub fn open(path: impl Into<PathBuf>, refresh: bool) -> Result<Self> {
        let path = path.into();
        let values = if refresh {
            BTreeMap::new()
        } else {
            match fs::read_to_string(&path) {
                Ok(text) => serde_json::from_str(&text).map_err(|e| Error::json(&path, e))?,
                Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
                Err(e) => return Err(Error::io(&path, e)),
            }
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        self.values.insert(key.into(), value);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let text = serde_json::to_string(&self.values).map_err(|e| Error::json(&self.path, e))?;
        fs::write(&self.path, text).map_err(|e| Error::io(&self.path, e))
    }
}

/// Everything [`Report`] computes, for one-shot output.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub mentions: BTreeMap<String, u64>,
    pub mention_types: BTreeMap<String, BTreeMap<String, u64>>,
    pub clusters: BTreeMap<String, u64>,
    pub cluster_types: BTreeMap<String, BTreeMap<String, u64>>,
    pub total_clusters: u64,
}

pub struct Report<'m> {
    model: &'m ClusterModel,
    memory: ReportMemory,
}

fn singular(category: Category) -> &'static str {
    match category {
        Category::Entity => "entity",
        Category::Event => "event",
        Category::Relation => "relation",
    }
}

impl<'m> Report<'m> {
    pub fn new(model: &'m ClusterModel, memory: ReportMemory) -> Self {
        Self { model, memory }
    }

    fn memoized<T, F>(&mut self, key: String, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&ClusterModel) -> Result<T>,
    {
        if let Some(value) = self.memory.get(&key) {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(v) => return Ok(v),
                Err(err) => tracing::warn!(%key, error = %err, "recomputing unreadable report value"),
            }
        }
        let value = compute(self.model)?;
        let json = serde_json::to_value(&value).map_err(|e| Error::json(self.memory.path(), e))?;
        self.memory.insert(key, json)?;
        Ok(value)
    }

    /// Non-prototype mentions of a category.
    pub fn num_of(&mut self, category: Category) -> Result<u64> {
        self.memoized(format!("num_of_{}", category.plural()), |model| {
            count(model, &queries::report_mentions(model.scope(), category))
        })
    }

    pub fn type_histogram(&mut self, category: Category) -> Result<BTreeMap<String, u64>> {
        self.memoized(format!("map_of_{}_types", singular(category)), |model| {
            histogram(model, &queries::report_types(model.scope(), category, false))
        })
    }

    pub fn num_of_clusters(&mut self, category: Category) -> Result<u64> {
        self.memoized(format!("num_of_{}_clusters", singular(category)), |model| {
            count(model, &queries::report_clusters(model.scope(), category))
        })
    }

    pub fn cluster_type_histogram(&mut self, category: Category) -> Result<BTreeMap<String, u64>> {
        self.memoized(format!("map_of_{}_cluster_types", singular(category)), |model| {
            histogram(model, &queries::report_types(model.scope(), category, true))
        })
    }

    /// Always queried live.
    pub fn total_clusters(&self) -> Result<u64> {
        count(self.model, &queries::report_total_clusters(self.model.scope()))
    }

    pub fn summary(&mut self) -> Result<ReportSummary> {
        let mut summary = ReportSummary {
            mentions: BTreeMap::new(),
            mention_types: BTreeMap::new(),
            clusters: BTreeMap::new(),
            cluster_types: BTreeMap::new(),
            total_clusters: self.total_clusters()?,
        };
        for category in Category::ALL {
            let key = category.plural().to_string();
            summary.mentions.insert(key.clone(), self.num_of(category)?);
            summary
                .mention_types
                .insert(key.clone(), self.type_histogram(category)?);
            summary
                .clusters
                .insert(key.clone(), self.num_of_clusters(category)?);
            summary
                .cluster_types
                .insert(key, self.cluster_type_histogram(category)?);
        }
        Ok(summary)
    }
}

fn count(model: &ClusterModel, query: &Query) -> Result<u64> {
    let rows = model.service().select(query)?;
    Ok(rows
        .first()
        .map(|r| r.count("n"))
        .transpose()?
        .flatten()
        .unwrap_or(0))
}

fn histogram(model: &ClusterModel, query: &Query) -> Result<BTreeMap<String, u64>> {
    let mut out = BTreeMap::new();
    for row in model.service().select(query)? {
        let Some(cate) = row.non_empty("cate") else {
            continue;
        };
        let name = cate.strip_prefix(SEEDLING).unwrap_or(&cate).to_string();
        match row.count("n") {
            Ok(n) => *out.entry(name).or_default() += n.unwrap_or(0),
            Err(err) => tracing::warn!(category = %cate, error = %err, "skipping malformed type count"),
        }
    }
    Ok(out)
}
