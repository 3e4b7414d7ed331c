//! Comparison of cluster membership against a reference clustering.

use clusterscope_sparql::{is_retryable, with_retries, HttpOptions, QueryError};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::cluster::Cluster;
use crate::namespace::Scope;
use crate::{Error, Result};

/// Answer of a [`GroundTruthSource`] for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceLookup {
    /// No reference clustering exists for this repository / graph.
    NotConfigured,
    /// Members of the reference cluster containing the member; empty when
    /// the member is not in any reference cluster.
    Members(Vec<String>),
}

pub trait GroundTruthSource {
    fn reference_cluster(&self, scope: &Scope, member: &str) -> Result<ReferenceLookup>;
}

/// Hit/miss/missing partition of a cluster against its reference cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Groundtruth {
    pub reference: BTreeSet<String>,
    /// Members also in the reference.
    pub hit: BTreeSet<String>,
    /// Members not in the reference.
    pub miss: BTreeSet<String>,
    /// Reference members absent from the cluster, with the cluster that
    /// actually holds each one.
    pub missing: BTreeMap<String, Option<String>>,
}

impl Groundtruth {
    pub fn partition(members: &BTreeSet<String>, reference: impl IntoIterator<Item = String>) -> Self {
        let reference: BTreeSet<String> = reference.into_iter().collect();
        let (hit, miss): (BTreeSet<String>, BTreeSet<String>) = members
            .iter()
            .cloned()
            .partition(|m| reference.contains(m));
        let missing = reference
            .difference(members)
            .map(|m| (m.clone(), None))
            .collect();
        Self {
            reference,
            hit,
            miss,
            missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundTruthStatus {
    NotConfigured,
    /// Configured, but no member appears in any reference cluster.
    NoReference,
    Found(Groundtruth),
}

impl GroundTruthStatus {
    pub fn found(&self) -> Option<&Groundtruth> {
        match self {
            GroundTruthStatus::Found(gt) => Some(gt),
            _ => None,
        }
    }
}

pub struct GroundTruthComparer<'a> {
    source: &'a dyn GroundTruthSource,
}

impl<'a> GroundTruthComparer<'a> {
    pub fn new(source: &'a dyn GroundTruthSource) -> Self {
        Self { source }
    }

    /// Uses the reference cluster of the first member (in URI order) that
    /// has a non-empty one.
    pub fn compare(&self, cluster: &Cluster<'_>) -> Result<GroundTruthStatus> {
        let model = cluster.model();
        let members: BTreeSet<String> = cluster
            .members()?
            .iter()
            .map(|m| m.uri().to_string())
            .collect();

        let mut reference = None;
        for member in &members {
            match self.source.reference_cluster(model.scope(), member)? {
                ReferenceLookup::NotConfigured => {
                    tracing::debug!(cluster = %cluster.uri(), "ground truth not configured");
                    return Ok(GroundTruthStatus::NotConfigured);
                }
                ReferenceLookup::Members(list) if !list.is_empty() => {
                    reference = Some(list);
                    break;
                }
                ReferenceLookup::Members(_) => {}
            }
        }
        let Some(reference) = reference else {
            return Ok(GroundTruthStatus::NoReference);
        };

        let mut gt = Groundtruth::partition(&members, reference);
        for (uri, owner) in gt.missing.iter_mut() {
            *owner = model.member(uri).cluster_uri()?.map(str::to_string);
        }
        tracing::debug!(
            cluster = %cluster.uri(),
            hit = gt.hit.len(),
            miss = gt.miss.len(),
            missing = gt.missing.len(),
            "compared with ground truth"
        );
        Ok(GroundTruthStatus::Found(gt))
    }
}

/// Ground-truth service answering `GET {base}/{repo}?g=<graph>&e=<member>`
/// with a JSON list of member URIs; 404 means not configured. Transport
/// failures and 5xx answers are retried per [`HttpOptions`].
pub struct HttpGroundTruth {
    client: Client,
    base: String,
    options: HttpOptions,
}

impl HttpGroundTruth {
    pub fn new(base: impl Into<String>, options: HttpOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| Error::GroundTruth(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base: base.into(),
            options,
        })
    }

    pub fn request_url(&self, scope: &Scope, member: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base.trim_end_matches('/'), scope.repo());
        let mut url =
            Url::parse(&raw).map_err(|e| Error::GroundTruth(format!("invalid url {raw}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(graph) = scope.graph() {
                pairs.append_pair("g", graph);
            }
            pairs.append_pair("e", member);
        }
        Ok(url)
    }

    fn fetch_once(&self, url: &Url) -> std::result::Result<ReferenceLookup, QueryError> {
        let endpoint = url.to_string();
        let resp = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| QueryError::Transport {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(ReferenceLookup::NotConfigured);
        }
        if !status.is_success() {
            return Err(QueryError::Status {
                endpoint,
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        let members: Vec<String> = resp
            .json()
            .map_err(|e| QueryError::InvalidResponse(format!("{endpoint}: {e}")))?;
        Ok(ReferenceLookup::Members(members))
    }
}

impl GroundTruthSource for HttpGroundTruth {
    fn reference_cluster(&self, scope: &Scope, member: &str) -> Result<ReferenceLookup> {
        let url = self.request_url(scope, member)?;
        with_retries(&self.options, "groundtruth", is_retryable, |attempt| {
            tracing::debug!(%url, attempt, "ground-truth request");
            self.fetch_once(&url)
        })
        .map_err(|e| Error::GroundTruth(e.to_string()))
    }
}

/// Ground truth from `<dir>/<scope id>.jl`, one JSON list of member URIs
/// per line. A missing file means not configured.
pub struct FileGroundTruth {
    dir: PathBuf,
    loaded: Mutex<HashMap<String, Arc<Vec<Vec<String>>>>>,
}

impl FileGroundTruth {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, scope: &Scope) -> PathBuf {
        self.dir.join(format!("{}.jl", scope.file_id()))
    }

    pub fn has_groundtruth(&self, scope: &Scope) -> bool {
        self.path_for(scope).is_file()
    }

    fn clusters(&self, scope: &Scope) -> Result<Option<Arc<Vec<Vec<String>>>>> {
        let key = scope.file_id();
        let mut loaded = self.loaded.lock();
        if let Some(clusters) = loaded.get(&key) {
            return Ok(Some(clusters.clone()));
        }
        let path = self.path_for(scope);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let clusters = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<Vec<String>>(l).map_err(|e| Error::json(&path, e)))
            .collect::<Result<Vec<_>>>()?;
        let clusters = Arc::new(clusters);
        loaded.insert(key, clusters.clone());
        Ok(Some(clusters))
    }
}

impl GroundTruthSource for FileGroundTruth {
    fn reference_cluster(&self, scope: &Scope, member: &str) -> Result<ReferenceLookup> {
        let Some(clusters) = self.clusters(scope)? else {
            return Ok(ReferenceLookup::NotConfigured);
        };
        Ok(ReferenceLookup::Members(
            clusters
                .iter()
                .find(|c| c.iter().any(|m| m == member))
                .cloned()
                .unwrap_or_default(),
        ))
    }
}
