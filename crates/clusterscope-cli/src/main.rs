//! Clusterscope CLI
//!
//! Command-line explorer for same-as clusters in a SPARQL repository:
//! - Listing and inspecting clusters, members and their super edges
//! - Rebuilding a document's mentions from justification offsets
//! - Neighborhood diagrams (DOT / JSON) and Graphviz images
//! - Ground-truth comparison and repository-wide reports
//! - Building the per-repository summary cache

use anyhow::{Context as _, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use clusterscope_core::{
    Category, ClusterModel, DebugStore, FileGroundTruth, GroundTruthSource, HttpGroundTruth,
    ImageFormat, LayoutFormat, Scope, Settings, SortBy, SummaryCaches, WikidataLookup,
};
use clusterscope_sparql::{HttpQueryService, SharedQueryService};

mod explore;
mod viz;

#[derive(Parser)]
#[command(name = "clusterscope")]
#[command(author, version, about = "Clusterscope: explore same-as clusters of extracted knowledge")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct GlobalArgs {
    /// Settings file (JSON); `CLUSTERSCOPE_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Base URL of the repositories (`<endpoint>/<repo>` is queried).
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Repository; defaults to the first configured one.
    #[arg(long, global = true)]
    repo: Option<String>,
    /// Named graph inside the repository.
    #[arg(long, global = true)]
    graph: Option<String>,
    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List clusters of one category.
    List {
        /// entity | event | relation
        category: Category,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// size | type
        #[arg(long, default_value_t = SortBy::Size)]
        sort: SortBy,
        #[arg(long)]
        json: bool,
    },

    /// Show a cluster: prototype, members, super edges and link targets.
    Show {
        uri: String,
        /// Resolve link targets to Wikidata nodes.
        #[arg(long)]
        qnodes: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show one cluster member with its provenance and roles.
    Member {
        uri: String,
        /// Print the source text around each justification span.
        #[arg(long)]
        context: bool,
        #[arg(long)]
        json: bool,
    },

    /// Emit the neighborhood diagram of a cluster.
    Neighborhood {
        uri: String,
        #[arg(long, default_value_t = 1)]
        hops: usize,
        /// Keep at most this many edges.
        #[arg(long)]
        max_edges: Option<usize>,
        /// dot | json
        #[arg(long, default_value = "dot", value_parser = LayoutFormat::parse)]
        format: LayoutFormat,
        /// Label wrap width in characters.
        #[arg(long, default_value_t = clusterscope_core::layout::DEFAULT_WRAP_WIDTH)]
        wrap_width: usize,
        /// Output path (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Render the neighborhood of a cluster to an image with Graphviz.
    Render {
        uri: String,
        #[arg(long, default_value_t = 1)]
        hops: usize,
        #[arg(long)]
        max_edges: Option<usize>,
        /// svg | png
        #[arg(long, default_value = "svg", value_parser = ImageFormat::parse)]
        format: ImageFormat,
        /// Graphviz program to run.
        #[arg(long, default_value = "dot")]
        program: String,
    },

    /// Rebuild a source document from the mentions justified in it.
    Document {
        doc_id: String,
        /// Emit HTML markup instead of plain text.
        #[arg(long, conflicts_with = "json")]
        html: bool,
        #[arg(long)]
        json: bool,
    },

    /// Compare a cluster against the reference clustering.
    Groundtruth {
        uri: String,
        #[arg(long)]
        json: bool,
    },

    /// Repository-wide mention and cluster statistics.
    Report {
        /// Ignore previously stored values.
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },

    /// Build the summary cache for the selected repository / graph.
    BuildCache {
        /// Rebuild even if a cache file exists.
        #[arg(long)]
        force: bool,
    },
}

/// Settings and scope resolved from the command line, plus the factories
/// every command draws its collaborators from.
pub struct Context {
    pub settings: Settings,
    pub scope: Scope,
}

impl Context {
    fn from_args(args: &GlobalArgs) -> Result<Self> {
        let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
        if let Some(endpoint) = &args.endpoint {
            settings.endpoint = endpoint.clone();
        }
        let repo = match &args.repo {
            Some(repo) => repo.clone(),
            None => settings.default_repository()?.to_string(),
        };
        let scope = Scope::new(repo, args.graph.clone());
        Ok(Self { settings, scope })
    }

    pub fn service(&self) -> Result<SharedQueryService> {
        let endpoint = self.settings.repository_endpoint(self.scope.repo());
        let service = HttpQueryService::new(&endpoint, self.settings.http_options())
            .with_context(|| format!("connecting to {endpoint}"))?;
        tracing::debug!(%endpoint, "query service ready");
        Ok(Arc::new(service))
    }

    pub fn summary_caches(&self) -> SummaryCaches {
        SummaryCaches::new(&self.settings.cache_dir)
    }

    /// Model for the scope, with the debug overlay attached when one exists.
    pub fn model(&self) -> Result<ClusterModel> {
        let model = ClusterModel::open(self.service()?, self.scope.clone(), &self.summary_caches())?;
        let debug = DebugStore::new(&self.settings.debug_dir);
        if debug.has_debug(&self.scope) {
            tracing::debug!(dir = %self.settings.debug_dir.display(), "using debug overlay");
            return Ok(model.with_debug(Arc::new(debug)));
        }
        Ok(model)
    }

    pub fn groundtruth_source(&self) -> Result<Box<dyn GroundTruthSource>> {
        match &self.settings.groundtruth_url {
            Some(url) => Ok(Box::new(HttpGroundTruth::new(
                url.clone(),
                self.settings.groundtruth_options(),
            )?)),
            None => Ok(Box::new(FileGroundTruth::new(&self.settings.groundtruth_dir))),
        }
    }

    pub fn wikidata(&self) -> Result<WikidataLookup> {
        let service = HttpQueryService::new(
            &self.settings.wikidata_endpoint,
            self.settings.wikidata_options(),
        )?;
        Ok(WikidataLookup::new(Arc::new(service)))
    }

    /// Images are kept per scope so names cannot collide across repositories.
    pub fn image_dir(&self) -> PathBuf {
        self.settings.image_dir.join(self.scope.file_id())
    }

    /// `report.json` becomes `report-<scope id>.json`.
    pub fn report_path(&self) -> PathBuf {
        scoped_file(&self.settings.report_file, &self.scope.file_id())
    }
}

fn scoped_file(path: &Path, id: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{id}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{id}"),
    };
    path.with_file_name(name)
}

fn init_tracing(verbose: u8) {
    let filter = if verbose > 0 {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    let ctx = Context::from_args(&cli.global)?;

    match cli.command {
        Commands::List {
            category,
            limit,
            offset,
            sort,
            json,
        } => explore::cmd_list(&ctx, category, limit, offset, sort, json),
        Commands::Show { uri, qnodes, json } => explore::cmd_show(&ctx, &uri, qnodes, json),
        Commands::Member { uri, context, json } => explore::cmd_member(&ctx, &uri, context, json),
        Commands::Neighborhood {
            uri,
            hops,
            max_edges,
            format,
            wrap_width,
            out,
        } => viz::cmd_neighborhood(
            &ctx,
            &uri,
            viz::NeighborhoodArgs {
                hops,
                max_edges,
                format,
                wrap_width,
                out,
            },
        ),
        Commands::Render {
            uri,
            hops,
            max_edges,
            format,
            program,
        } => viz::cmd_render(&ctx, &uri, hops, max_edges, format, &program),
        Commands::Document { doc_id, html, json } => explore::cmd_document(&ctx, &doc_id, html, json),
        Commands::Groundtruth { uri, json } => explore::cmd_groundtruth(&ctx, &uri, json),
        Commands::Report { refresh, json } => explore::cmd_report(&ctx, refresh, json),
        Commands::BuildCache { force } => explore::cmd_build_cache(&ctx, force),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "clusterscope",
            "neighborhood",
            "http://www.isi.edu/gaia/entities/e1-cluster",
            "--hops",
            "2",
            "--format",
            "json",
            "--repo",
            "eval",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.global.repo.as_deref(), Some("eval"));
        assert_eq!(cli.global.verbose, 1);
        match cli.command {
            Commands::Neighborhood {
                hops,
                format,
                wrap_width,
                ..
            } => {
                assert_eq!(hops, 2);
                assert_eq!(format, LayoutFormat::Json);
                assert_eq!(wrap_width, 20);
            }
            _ => panic!("expected neighborhood"),
        }
    }

    #[test]
    fn rejects_unknown_category() {
        assert!(Cli::try_parse_from(["clusterscope", "list", "people"]).is_err());
        let cli = Cli::try_parse_from(["clusterscope", "list", "events", "--sort", "type"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List {
                category: Category::Event,
                sort: SortBy::Type,
                ..
            }
        ));
    }

    #[test]
    fn document_output_modes_are_exclusive() {
        let cli = Cli::try_parse_from(["clusterscope", "document", "HC000T6IV", "--html"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Document { ref doc_id, html: true, json: false } if doc_id == "HC000T6IV"
        ));
        assert!(Cli::try_parse_from(["clusterscope", "document", "d", "--html", "--json"]).is_err());
    }

    #[test]
    fn scope_specific_paths() {
        assert_eq!(
            scoped_file(Path::new("out/report.json"), "eval-http-g"),
            PathBuf::from("out/report-eval-http-g.json")
        );
        assert_eq!(
            scoped_file(Path::new("report"), "eval"),
            PathBuf::from("report-eval")
        );
    }

    #[test]
    fn repo_flag_wins_over_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"repositories": ["first", "second"], "image_dir": "img"}"#).unwrap();
        let args = GlobalArgs {
            config: Some(path.clone()),
            repo: Some("second".to_string()),
            graph: Some("http://g/1".to_string()),
            ..GlobalArgs::default()
        };
        let ctx = Context::from_args(&args).unwrap();
        assert_eq!(ctx.scope.repo(), "second");
        assert_eq!(ctx.image_dir(), PathBuf::from("img").join("second-http-g-1"));

        let defaulted = Context::from_args(&GlobalArgs {
            config: Some(path),
            ..GlobalArgs::default()
        })
        .unwrap();
        assert_eq!(defaulted.scope.repo(), "first");
    }
}
