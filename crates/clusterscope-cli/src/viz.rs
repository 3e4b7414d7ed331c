//! Neighborhood diagrams and rendered images.
//!
//! Output formats:
//! - Graphviz DOT (layout left to external tooling)
//! - JSON (for custom frontends)
//! - SVG / PNG through a Graphviz program

use anyhow::{Context as _, Result};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

use clusterscope_core::{
    GraphLayoutBuilder, GraphvizRenderer, ImageFormat, LayoutFormat, NeighborhoodExpander,
    NeighborhoodOptions,
};

use crate::explore::require_cluster;
use crate::Context;

#[derive(Debug, Clone)]
pub struct NeighborhoodArgs {
    pub hops: usize,
    pub max_edges: Option<usize>,
    pub format: LayoutFormat,
    pub wrap_width: usize,
    pub out: Option<PathBuf>,
}

pub fn cmd_neighborhood(ctx: &Context, uri: &str, args: NeighborhoodArgs) -> Result<()> {
    let model = ctx.model()?;
    require_cluster(&model, uri)?;
    let expander = NeighborhoodExpander::new(&model);
    let neighborhood = expander.neighborhood(
        uri,
        NeighborhoodOptions {
            hops: args.hops,
            max_edges: args.max_edges,
        },
    )?;
    let graph = GraphLayoutBuilder::new()
        .with_wrap_width(args.wrap_width)
        .build(&neighborhood, &expander)?;
    let text = graph.render(args.format)?;

    match &args.out {
        Some(path) => {
            fs::write(path, &text).with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} {} ({} nodes, {} edges)",
                "wrote".green().bold(),
                path.display().to_string().bold(),
                graph.nodes.len(),
                graph.edges.len()
            );
        }
        None => println!("{text}"),
    }
    if neighborhood.truncated {
        eprintln!(
            "{} kept the first {} edges; raise --max-edges to see more",
            "warning:".yellow().bold(),
            neighborhood.edges.len()
        );
    }
    Ok(())
}

pub fn cmd_render(
    ctx: &Context,
    uri: &str,
    hops: usize,
    max_edges: Option<usize>,
    format: ImageFormat,
    program: &str,
) -> Result<()> {
    let model = ctx.model()?;
    require_cluster(&model, uri)?;
    let expander = NeighborhoodExpander::new(&model);
    let renderer = GraphvizRenderer::new(ctx.image_dir())
        .with_program(program)
        .with_format(format);
    let image = renderer.cluster_image(&expander, uri, NeighborhoodOptions { hops, max_edges })?;
    println!("{}", renderer.out_dir().join(image).display());
    Ok(())
}
