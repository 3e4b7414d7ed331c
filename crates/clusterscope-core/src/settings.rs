//! Deployment settings.
//!
//! Resolved in three layers: defaults, an optional JSON file, then
//! `CLUSTERSCOPE_*` environment variables. The CLI applies its flags last.

use clusterscope_sparql::HttpOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const ENV_PREFIX: &str = "CLUSTERSCOPE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the repositories; a repository's endpoint is
    /// `<endpoint>/<repo>`.
    pub endpoint: String,
    pub wikidata_endpoint: String,
    pub groundtruth_url: Option<String>,
    /// Used when `groundtruth_url` is unset.
    pub groundtruth_dir: PathBuf,
    pub username: Option<String>,
    pub password: Option<String>,
    pub repositories: Vec<String>,
    pub cache_dir: PathBuf,
    pub debug_dir: PathBuf,
    pub image_dir: PathBuf,
    pub source_map: Option<PathBuf>,
    pub report_file: PathBuf,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7200/repositories".to_string(),
            wikidata_endpoint: "https://query.wikidata.org/sparql".to_string(),
            groundtruth_url: None,
            groundtruth_dir: PathBuf::from("gt"),
            username: None,
            password: None,
            repositories: Vec::new(),
            cache_dir: PathBuf::from("cache"),
            debug_dir: PathBuf::from("debug"),
            image_dir: PathBuf::from("img"),
            source_map: None,
            report_file: PathBuf::from("report.json"),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `path` (when given) and the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| Error::json(path, e))
    }

    /// Apply `CLUSTERSCOPE_<FIELD>` overrides; `lookup` stands in for the
    /// environment. `REPOSITORIES` is comma separated.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = var("WIKIDATA_ENDPOINT") {
            self.wikidata_endpoint = v;
        }
        if let Some(v) = var("GROUNDTRUTH_URL") {
            self.groundtruth_url = Some(v);
        }
        if let Some(v) = var("GROUNDTRUTH_DIR") {
            self.groundtruth_dir = v.into();
        }
        if let Some(v) = var("USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = var("PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = var("REPOSITORIES") {
            self.repositories = v
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = var("CACHE_DIR") {
            self.cache_dir = v.into();
        }
        if let Some(v) = var("DEBUG_DIR") {
            self.debug_dir = v.into();
        }
        if let Some(v) = var("IMAGE_DIR") {
            self.image_dir = v.into();
        }
        if let Some(v) = var("SOURCE_MAP") {
            self.source_map = Some(v.into());
        }
        if let Some(v) = var("REPORT_FILE") {
            self.report_file = v.into();
        }
        if let Some(v) = var("TIMEOUT_SECS") {
            self.timeout_secs = v
                .trim()
                .parse()
                .map_err(|_| Error::Settings(format!("{ENV_PREFIX}TIMEOUT_SECS: `{v}` is not a number")))?;
        }
        if let Some(v) = var("MAX_RETRIES") {
            self.max_retries = v
                .trim()
                .parse()
                .map_err(|_| Error::Settings(format!("{ENV_PREFIX}MAX_RETRIES: `{v}` is not a number")))?;
        }
        Ok(())
    }

    pub fn repository_endpoint(&self, repo: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), repo)
    }

    /// Options for the store client; credentials only go to the store.
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            username: self.username.clone(),
            password: self.password.clone(),
            ..HttpOptions::default()
        }
    }

    /// Options for the public Wikidata endpoint.
    pub fn wikidata_options(&self) -> HttpOptions {
        self.unauthenticated_options()
    }

    /// Options for the ground-truth service; repository credentials are
    /// never sent there.
    pub fn groundtruth_options(&self) -> HttpOptions {
        self.unauthenticated_options()
    }

    fn unauthenticated_options(&self) -> HttpOptions {
        HttpOptions {
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            ..HttpOptions::default()
        }
    }

    /// Repository to use when none is named: the first configured one.
    pub fn default_repository(&self) -> Result<&str> {
        self.repositories
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::Settings("no repository configured".to_string()))
    }
}
