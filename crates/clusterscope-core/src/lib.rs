//! Clusterscope cluster graph engine.
//!
//! Explores a knowledge-extraction graph in which mentions produced by
//! several extraction systems are grouped into same-as clusters:
//!
//! ```text
//!  ClusterModel ──► Cluster (lazy, per property) ──► QueryService (SPARQL)
//!        │               │
//!        │               ├─ prototype / members / size
//!        │               ├─ forward / backward  (SuperEdge sets)
//!        │               └─ groundtruth / debug overlay
//!        ▼
//!  NeighborhoodExpander ──► GraphLayoutBuilder ──► Renderer (Graphviz)
//! ```
//!
//! Everything here is request-scoped and single-threaded: a [`ClusterModel`]
//! and the clusters it hands out are built per request. Only the on-disk
//! summary caches and debug overlays ([`SummaryCaches`], [`DebugStore`]) live
//! for the whole process.

pub mod cluster;
pub mod debug;
pub mod document;
pub mod edge;
pub mod error;
pub mod groundtruth;
pub mod layout;
pub mod linking;
pub mod member;
pub mod model;
pub mod namespace;
pub mod neighborhood;
pub mod queries;
pub mod render;
pub mod report;
pub mod settings;
pub mod source_context;
pub mod summary_cache;

pub use cluster::Cluster;
pub use debug::{DebugInfo, DebugStore, LinkCandidate};
pub use document::{JustifiedMention, Markup, RecoveredDocument};
pub use edge::{count_from_confidence, SuperEdge, MAX_EDGE_COUNT};
pub use error::{Error, Result};
pub use groundtruth::{
    FileGroundTruth, GroundTruthComparer, GroundTruthSource, GroundTruthStatus, Groundtruth,
    HttpGroundTruth, ReferenceLookup,
};
pub use layout::{
    text_justify, GraphLayoutBuilder, LayoutEdge, LayoutFormat, LayoutGraph, LayoutNode, NodeInfo,
    NodeInfoSource,
};
pub use linking::{normalize_link_target, ExternalLinkLookup, ExternalNode, WikidataLookup};
pub use member::{ClusterMember, LinkTarget, Span};
pub use model::{ClusterModel, ClusterSummaries, ClusterSummary, SortBy};
pub use namespace::{Category, Scope};
pub use neighborhood::{Neighborhood, NeighborhoodExpander, NeighborhoodOptions};
pub use render::{GraphvizRenderer, ImageFormat, Renderer};
pub use report::{Report, ReportMemory};
pub use settings::Settings;
pub use source_context::SourceContext;
pub use summary_cache::{SummaryCache, SummaryCacheBuilder, SummaryCaches, SummaryEntry};
