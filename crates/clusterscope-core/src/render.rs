//! Image rendering through an external Graphviz program.

use clusterscope_sparql::local_name;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::layout::{GraphLayoutBuilder, LayoutGraph};
use crate::neighborhood::{NeighborhoodExpander, NeighborhoodOptions};
use crate::{Error, Result};

const LAYOUT_ARGS: [&str; 4] = [
    "-Ksfdp",
    "-Goverlap=prism",
    "-Goverlap_scaling=5",
    "-Gsep=+20",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageFormat {
    #[default]
    Svg,
    Png,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            other => Err(format!("unknown image format `{other}` (expected svg|png)")),
        }
    }
}

/// Turns a diagram into an image file and returns its logical name
/// (`<graph name>.<ext>`), relative to the renderer's output directory.
pub trait Renderer {
    fn render(&self, graph: &LayoutGraph) -> Result<String>;
}

pub struct GraphvizRenderer {
    program: String,
    out_dir: PathBuf,
    format: ImageFormat,
}

impl GraphvizRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: "dot".to_string(),
            out_dir: out_dir.into(),
            format: ImageFormat::default(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn image_name(&self, name: &str) -> String {
        format!("{name}.{}", self.format.extension())
    }

    /// Image for a cluster's neighborhood; an image already on disk is
    /// reused without querying anything. The name carries the hop count and
    /// the edge bound, if any: `<local>-h<hops>[-e<max_edges>]`.
    pub fn cluster_image(
        &self,
        expander: &NeighborhoodExpander<'_>,
        cluster_uri: &str,
        options: NeighborhoodOptions,
    ) -> Result<String> {
        let name = cluster_image_name(cluster_uri, options);
        let image = self.image_name(&name);
        if self.out_dir.join(&image).is_file() {
            tracing::debug!(%image, "reusing rendered image");
            return Ok(image);
        }
        let neighborhood = expander.neighborhood(cluster_uri, options)?;
        let mut graph = GraphLayoutBuilder::new().build(&neighborhood, expander)?;
        graph.name = name;
        self.render(&graph)
    }
}

fn cluster_image_name(cluster_uri: &str, options: NeighborhoodOptions) -> String {
    let mut name = format!("{}-h{}", local_name(cluster_uri), options.hops);
    if let Some(max) = options.max_edges {
        name.push_str(&format!("-e{max}"));
    }
    name
}

impl Renderer for GraphvizRenderer {
    fn render(&self, graph: &LayoutGraph) -> Result<String> {
        fs::create_dir_all(&self.out_dir).map_err(|e| Error::io(&self.out_dir, e))?;
        let dot_path = self.out_dir.join(format!("{}.dot", graph.name));
        fs::write(&dot_path, graph.to_dot()).map_err(|e| Error::io(&dot_path, e))?;

        let image = self.image_name(&graph.name);
        let image_path = self.out_dir.join(&image);
        let status = Command::new(&self.program)
            .arg(format!("-T{}", self.format.extension()))
            .arg("-o")
            .arg(&image_path)
            .arg(&dot_path)
            .args(LAYOUT_ARGS)
            .status()
            .map_err(|e| Error::Render(format!("failed to run {}: {e}", self.program)))?;
        if !status.success() {
            return Err(Error::Render(format!("{} exited with {status}", self.program)));
        }
        tracing::info!(image = %image_path.display(), "rendered graph");
        Ok(image)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::ClusterModel;
    use crate::namespace::Scope;
    use crate::namespace::Category;
    use crate::summary_cache::{SummaryCache, SummaryEntry};
    use clusterscope_sparql::ScriptedQueryService;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn graph() -> LayoutGraph {
        LayoutGraph {
            name: "g1".into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            truncated: false,
        }
    }

    #[test]
    fn writes_dot_and_returns_logical_name() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = GraphvizRenderer::new(dir.path()).with_program("true");
        assert_eq!(renderer.render(&graph()).unwrap(), "g1.svg");
        let dot = fs::read_to_string(dir.path().join("g1.dot")).unwrap();
        assert!(dot.starts_with("digraph G {"));
    }

    #[test]
    fn program_failures_surface_as_render_errors() {
        let dir = tempfile::tempdir().unwrap();
        let failing = GraphvizRenderer::new(dir.path()).with_program("false");
        assert!(matches!(failing.render(&graph()), Err(Error::Render(_))));
        let missing = GraphvizRenderer::new(dir.path()).with_program("/nonexistent/dot");
        assert!(matches!(missing.render(&graph()), Err(Error::Render(_))));
    }

    #[test]
    fn existing_cluster_image_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("c1-cluster-h1.png"), b"png").unwrap();
        let svc = Arc::new(ScriptedQueryService::new().strict());
        let model = ClusterModel::new(svc.clone(), Scope::new("r", None), Arc::new(SummaryCache::empty()));
        let expander = NeighborhoodExpander::new(&model);
        let renderer = GraphvizRenderer::new(dir.path())
            .with_program("false")
            .with_format(ImageFormat::Png);
        let image = renderer
            .cluster_image(&expander, "http://ex/c1-cluster", NeighborhoodOptions::default())
            .unwrap();
        assert_eq!(image, "c1-cluster-h1.png");
        assert!(svc.executed().is_empty());
    }

    #[test]
    fn bounded_request_does_not_reuse_the_full_image() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("c1-cluster-h1.svg"), b"full").unwrap();
        let mut entries = BTreeMap::new();
        entries.insert(
            "http://ex/c1-cluster".to_string(),
            SummaryEntry {
                label: Some("Obama".into()),
                type_iri: None,
                category: Some(Category::Entity),
                size: Some(2),
            },
        );
        let svc = Arc::new(ScriptedQueryService::new());
        let model = ClusterModel::new(
            svc.clone(),
            Scope::new("r", None),
            Arc::new(SummaryCache::from_entries(entries)),
        );
        let expander = NeighborhoodExpander::new(&model);
        let renderer = GraphvizRenderer::new(dir.path()).with_program("true");
        let bounded = NeighborhoodOptions {
            hops: 1,
            max_edges: Some(2),
        };

        let image = renderer
            .cluster_image(&expander, "http://ex/c1-cluster", bounded)
            .unwrap();
        assert_eq!(image, "c1-cluster-h1-e2.svg");
        assert!(!svc.executed().is_empty());
        assert!(dir.path().join("c1-cluster-h1-e2.dot").is_file());
        assert_eq!(fs::read(dir.path().join("c1-cluster-h1.svg")).unwrap(), b"full");
    }

    #[test]
    fn image_names_distinguish_hops_and_bounds() {
        let name = |hops, max_edges| {
            cluster_image_name("http://ex/c1-cluster", NeighborhoodOptions { hops, max_edges })
        };
        assert_eq!(name(1, None), "c1-cluster-h1");
        assert_eq!(name(2, None), "c1-cluster-h2");
        assert_eq!(name(1, Some(50)), "c1-cluster-h1-e50");
    }
}
