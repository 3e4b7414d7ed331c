//! Styled node/edge diagrams for a neighborhood, emitted as DOT or JSON.

use clusterscope_sparql::local_name;
use serde::Serialize;
use std::fmt::Write as _;

use crate::neighborhood::Neighborhood;
use crate::namespace::predicate_label;
use crate::Result;

pub const DEFAULT_WRAP_WIDTH: usize = 20;
pub const EDGE_COLOR: &str = "#d62728";
pub const EDGE_ARROW_SIZE: &str = "0.7";
const FALLBACK_COLOR: &str = "#17becf";

/// Fill color for a fine type (by local name).
pub fn node_color(type_name: &str) -> &'static str {
    match type_name {
        "Facility" => "#7f7f7f",
        "GeopoliticalEntity" => "#e377c2",
        "Location" => "#8c564b",
        "Organization" => "#9467bd",
        "Person" => "#1f77b4",
        "FillerType" | "Relation" => "#ff7f0e",
        _ => FALLBACK_COLOR,
    }
}

/// Greedy word wrap.
///
/// Words are packed while `letters + spaces <= width`; a word longer than
/// `width` gets a line of its own. The last line is padded to be centered
/// against the widest earlier line.
pub fn text_justify(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut letters = 0;
    let mut widest = 0;
    for word in text.split_whitespace() {
        let len = word.chars().count();
        if !current.is_empty() && letters + len + current.len() > width {
            let line = current.join(" ");
            widest = widest.max(line.chars().count());
            lines.push(line);
            current.clear();
            letters = 0;
        }
        current.push(word);
        letters += len;
    }
    let last = current.join(" ");
    let pad = widest.saturating_sub(last.chars().count());
    let left = pad / 2;
    lines.push(format!("{}{}{}", " ".repeat(left), last, " ".repeat(pad - left)));
    lines
}

/// What the diagram shows for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub label: String,
    pub count: u64,
    pub type_iri: Option<String>,
    /// Relation hubs are drawn without a label.
    pub relation: bool,
}

pub trait NodeInfoSource {
    fn node_info(&self, uri: &str) -> Result<NodeInfo>;
}

impl NodeInfoSource for std::collections::BTreeMap<String, NodeInfo> {
    fn node_info(&self, uri: &str) -> Result<NodeInfo> {
        Ok(self.get(uri).cloned().unwrap_or_else(|| NodeInfo {
            label: local_name(uri).to_string(),
            count: 0,
            type_iri: None,
            relation: false,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutNode {
    pub id: String,
    pub label: Vec<String>,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutEdge {
    pub from: String,
    pub to: String,
    pub label: Vec<String>,
    pub color: String,
    pub arrowsize: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutGraph {
    pub name: String,
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutFormat {
    Dot,
    Json,
}

impl LayoutFormat {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dot" | "gv" => Ok(Self::Dot),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown layout format `{other}` (expected dot|json)")),
        }
    }
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn dot_label(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| dot_escape(l))
        .collect::<Vec<_>>()
        .join("\\n")
}

impl LayoutGraph {
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph G {\n  node[style=\"filled\"]\n");
        for node in &self.nodes {
            let _ = writeln!(
                out,
                "  \"{}\" [color=\"{}\" fillcolor=\"{}\" label=\"{}\"]",
                dot_escape(&node.id),
                node.color,
                node.color,
                dot_label(&node.label)
            );
        }
        for edge in &self.edges {
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [label=\"{}\" color=\"{}\" arrowsize=\"{}\"]",
                dot_escape(&edge.from),
                dot_escape(&edge.to),
                dot_label(&edge.label),
                edge.color,
                edge.arrowsize
            );
        }
        out.push('}');
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render(&self, format: LayoutFormat) -> serde_json::Result<String> {
        match format {
            LayoutFormat::Dot => Ok(self.to_dot()),
            LayoutFormat::Json => self.to_json(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphLayoutBuilder {
    wrap_width: usize,
}

impl Default for GraphLayoutBuilder {
    fn default() -> Self {
        Self {
            wrap_width: DEFAULT_WRAP_WIDTH,
        }
    }
}

impl GraphLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wrap_width(mut self, width: usize) -> Self {
        self.wrap_width = width.max(1);
        self
    }

    pub fn node_label(&self, text: &str, count: u64) -> Vec<String> {
        text_justify(&format!("{text} (×{count})"), self.wrap_width)
    }

    pub fn node(&self, uri: &str, info: &NodeInfo) -> LayoutNode {
        let color = if info.relation {
            node_color("Relation")
        } else {
            info.type_iri
                .as_deref()
                .map(local_name)
                .map_or(FALLBACK_COLOR, node_color)
        };
        let label = if info.relation {
            Vec::new()
        } else {
            self.node_label(&info.label, info.count)
        };
        LayoutNode {
            id: uri.to_string(),
            label,
            color: color.to_string(),
        }
    }

    /// Diagram for `neighborhood`, named after the origin's local name.
    pub fn build(&self, neighborhood: &Neighborhood, source: &dyn NodeInfoSource) -> Result<LayoutGraph> {
        let mut nodes = Vec::with_capacity(neighborhood.nodes.len());
        for uri in &neighborhood.nodes {
            nodes.push(self.node(uri, &source.node_info(uri)?));
        }
        let edges = neighborhood
            .sorted_edges()
            .into_iter()
            .map(|e| LayoutEdge {
                from: e.subject.clone(),
                to: e.object.clone(),
                label: self.node_label(predicate_label(&e.predicate), e.count),
                color: EDGE_COLOR.to_string(),
                arrowsize: EDGE_ARROW_SIZE.to_string(),
            })
            .collect();
        let name = match local_name(&neighborhood.origin) {
            "" => uuid::Uuid::new_v4().simple().to_string(),
            name => name.to_string(),
        };
        Ok(LayoutGraph {
            name,
            nodes,
            edges,
            truncated: neighborhood.truncated,
        })
    }
}
