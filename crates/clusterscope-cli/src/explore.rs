//! Text and JSON views over clusters, members and repository statistics.

use anyhow::{anyhow, Result};
use colored::Colorize;
use serde_json::{json, Value};
use std::collections::HashSet;

use clusterscope_core::namespace::predicate_label;
use clusterscope_core::{
    Category, Cluster, ClusterModel, ClusterSummary, GroundTruthStatus, Markup, Report,
    ReportMemory, SortBy, SourceContext, SuperEdge,
};
use clusterscope_sparql::local_name;

use crate::Context;

/// Cluster handle after an existence check.
pub fn require_cluster<'m>(model: &'m ClusterModel, uri: &str) -> Result<Cluster<'m>> {
    model
        .get_cluster(uri)?
        .ok_or_else(|| anyhow!("no cluster `{uri}` in repository `{}`", model.scope().repo()))
}

fn sorted_edges(edges: &HashSet<SuperEdge>) -> Vec<&SuperEdge> {
    let mut out: Vec<&SuperEdge> = edges.iter().collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.cmp_key(b)));
    out
}

fn edge_line(edge: &SuperEdge, other: &str) -> String {
    format!(
        "{:>5}  {:<20} {}",
        edge.count,
        predicate_label(&edge.predicate),
        other
    )
}

pub fn cmd_list(
    ctx: &Context,
    category: Category,
    limit: Option<usize>,
    offset: usize,
    sort: SortBy,
    json: bool,
) -> Result<()> {
    let model = ctx.model()?;
    let clusters: Vec<ClusterSummary> = model.list_clusters(category, limit, offset, sort)?.collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&clusters)?);
        return Ok(());
    }
    println!(
        "{} {} in {}",
        clusters.len().to_string().bold(),
        category.to_string().to_lowercase(),
        model.scope().repo().cyan()
    );
    for c in &clusters {
        println!(
            "{:>6}  {:<32} {}",
            c.count,
            c.label.as_deref().unwrap_or("-"),
            c.href.dimmed()
        );
    }
    Ok(())
}

pub fn cmd_show(ctx: &Context, uri: &str, qnodes: bool, json: bool) -> Result<()> {
    let model = ctx.model()?;
    let cluster = require_cluster(&model, uri)?;
    let prototype = cluster.prototype()?;
    let forward = sorted_edges(cluster.forward()?);
    let backward = sorted_edges(cluster.backward()?);
    let members = cluster.members()?;
    let targets = cluster.link_targets()?;
    let nodes = if qnodes {
        cluster.qnodes(&ctx.wikidata()?)?
    } else {
        Vec::new()
    };

    if json {
        let members: Vec<Value> = members
            .iter()
            .map(|m| -> clusterscope_core::Result<Value> {
                Ok(json!({
                    "uri": m.uri(),
                    "label": m.label()?,
                    "type": m.type_iri()?,
                    "link_targets": m.link_targets()?,
                }))
            })
            .collect::<clusterscope_core::Result<_>>()?;
        let out = json!({
            "uri": cluster.uri(),
            "href": cluster.href(),
            "label": cluster.label()?,
            "category": cluster.category()?.map(|c| c.to_string()),
            "type": cluster.type_iri()?,
            "size": cluster.size()?,
            "prototype": prototype.uri(),
            "members": members,
            "forward": forward,
            "backward": backward,
            "link_targets": targets,
            "qnodes": nodes,
            "debug_type": cluster.debug_info()?.and_then(|d| d.record_type()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} {}", cluster.label()?.bold(), format!("(×{})", cluster.size()?).dimmed());
    println!("  uri:       {}", cluster.uri());
    println!("  href:      {}", cluster.href());
    if let Some(category) = cluster.category()? {
        println!("  category:  {category}");
    }
    if let Some(t) = cluster.type_iri()? {
        println!("  type:      {}", local_name(t));
    }
    println!("  prototype: {}", prototype.short_id());
    if let Some(info) = cluster.debug_info()? {
        println!(
            "  debug:     {} ({} records)",
            info.record_type().unwrap_or("-"),
            info.members().len()
        );
    }

    println!("\n{}", "Members".green().bold());
    for m in members {
        let type_name = m.type_iri()?.map(local_name).unwrap_or("-");
        println!("  {:<40} {:<24} {}", m.short_id(), m.label()?, type_name.dimmed());
    }

    if !forward.is_empty() {
        println!("\n{}", "Outgoing".green().bold());
        for edge in &forward {
            println!("  {}", edge_line(edge, &edge.object));
        }
    }
    if !backward.is_empty() {
        println!("\n{}", "Incoming".green().bold());
        for edge in &backward {
            println!("  {}", edge_line(edge, &edge.subject));
        }
    }

    if !targets.is_empty() {
        println!("\n{}", "Link targets".green().bold());
        for (target, n) in &targets {
            println!("  {n:>5}  {target}");
        }
    }
    for (node, n) in &nodes {
        println!("  {} {} {} ({n})", "→".cyan(), node.id, node.label);
    }
    Ok(())
}

pub fn cmd_member(ctx: &Context, uri: &str, with_context: bool, json: bool) -> Result<()> {
    let model = ctx.model()?;
    let member = model.member(uri);
    let roles = member.roles()?;
    let events = member.events_by_role()?;
    let mentions = match (&ctx.settings.source_map, with_context) {
        (Some(path), true) => member.mentions(&SourceContext::load(path)?)?,
        (None, true) => {
            tracing::warn!("no source_map configured; skipping context");
            Vec::new()
        }
        _ => Vec::new(),
    };

    if json {
        let roles: Vec<Value> = roles
            .iter()
            .map(|(role, arg)| -> clusterscope_core::Result<Value> {
                Ok(json!({"role": role, "uri": arg.uri(), "label": arg.label()?}))
            })
            .collect::<clusterscope_core::Result<_>>()?;
        let events: Vec<Value> = events
            .iter()
            .map(|(role, event)| -> clusterscope_core::Result<Value> {
                Ok(json!({"role": role, "uri": event.uri(), "label": event.label()?}))
            })
            .collect::<clusterscope_core::Result<_>>()?;
        let out = json!({
            "uri": member.uri(),
            "label": member.label()?,
            "type": member.type_iri()?,
            "cluster": member.cluster_uri()?,
            "source": member.source()?,
            "spans": member.spans()?,
            "link_targets": member.link_targets()?,
            "labels": member.all_labels()?,
            "roles": roles,
            "events": events,
            "mentions": mentions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} {}", member.label()?.bold(), member.short_id().dimmed());
    if let Some(t) = member.type_iri()? {
        println!("  type:    {}", local_name(t));
    }
    if let Some(c) = member.cluster_uri()? {
        println!("  cluster: {} ({})", c, model.href(c));
    }
    if let Some(source) = member.source()? {
        let spans: Vec<String> = member
            .spans()?
            .iter()
            .map(|s| format!("{}-{}", s.start, s.end))
            .collect();
        println!("  source:  {source} [{}]", spans.join(", "));
    }
    for target in member.link_targets()? {
        match target.confidence {
            Some(c) => println!("  link:    {} ({c:.2})", target.target),
            None => println!("  link:    {}", target.target),
        }
    }
    let labels = member.all_labels()?;
    if !labels.is_empty() {
        println!("\n{}", "Labels".green().bold());
        for (label, n) in labels {
            println!("  {n:>5}  {label}");
        }
    }
    if !roles.is_empty() {
        println!("\n{}", "Roles".green().bold());
        for (role, arg) in &roles {
            println!("  {:<20} {} {}", role, arg.label()?, arg.short_id().dimmed());
        }
    }
    if !events.is_empty() {
        println!("\n{}", "Events".green().bold());
        for (role, event) in &events {
            println!("  {:<20} {} {}", role, event.label()?, event.short_id().dimmed());
        }
    }
    if !mentions.is_empty() {
        println!("\n{}", "Mentions".green().bold());
        for m in &mentions {
            println!("  {m}");
        }
    }
    Ok(())
}

pub fn cmd_document(ctx: &Context, doc_id: &str, html: bool, json: bool) -> Result<()> {
    let model = ctx.model()?;
    let doc = model.recover_document(doc_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }
    if doc.mentions.is_empty() {
        println!("{} no justifications cite `{doc_id}`", "info:".yellow().bold());
        return Ok(());
    }
    let markup = if html { Markup::Html } else { Markup::Plain };
    println!("{}", doc.render(markup));
    eprintln!(
        "{} mentions, {} pronominal",
        doc.mentions.len().to_string().bold(),
        doc.pronominal_count()
    );
    Ok(())
}

pub fn cmd_groundtruth(ctx: &Context, uri: &str, json: bool) -> Result<()> {
    let model = ctx.model()?;
    let cluster = require_cluster(&model, uri)?;
    let source = ctx.groundtruth_source()?;
    let status = cluster.groundtruth(source.as_ref())?;

    let gt = match status {
        GroundTruthStatus::NotConfigured => {
            println!(
                "{} no ground truth for {}",
                "info:".yellow().bold(),
                model.scope().file_id()
            );
            return Ok(());
        }
        GroundTruthStatus::NoReference => {
            println!("{} no member appears in the reference clustering", "info:".yellow().bold());
            return Ok(());
        }
        GroundTruthStatus::Found(gt) => gt,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(gt)?);
        return Ok(());
    }
    println!(
        "{} hit  {} miss  {} missing",
        gt.hit.len().to_string().green().bold(),
        gt.miss.len().to_string().red().bold(),
        gt.missing.len().to_string().yellow().bold()
    );
    for m in &gt.miss {
        println!("  {} {}", "miss".red(), m);
    }
    for (m, owner) in &gt.missing {
        match owner {
            Some(owner) => println!("  {} {} {} {}", "missing".yellow(), m, "in".dimmed(), model.href(owner)),
            None => println!("  {} {}", "missing".yellow(), m),
        }
    }
    Ok(())
}

pub fn cmd_report(ctx: &Context, refresh: bool, json: bool) -> Result<()> {
    let model = ctx.model()?;
    let memory = ReportMemory::open(ctx.report_path(), refresh)?;
    let summary = Report::new(&model, memory).summary()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "{} clusters in {}",
        summary.total_clusters.to_string().bold(),
        model.scope().file_id().cyan()
    );
    for category in Category::ALL {
        let key = category.to_string().to_lowercase();
        let plural = category.plural();
        println!(
            "\n{}  {} mentions, {} clusters",
            key.green().bold(),
            summary.mentions.get(plural).copied().unwrap_or(0),
            summary.clusters.get(plural).copied().unwrap_or(0)
        );
        if let Some(types) = summary.mention_types.get(plural) {
            let mut types: Vec<(&String, &u64)> = types.iter().collect();
            types.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (name, n) in types {
                println!("  {n:>7}  {name}");
            }
        }
    }
    Ok(())
}

pub fn cmd_build_cache(ctx: &Context, force: bool) -> Result<()> {
    let caches = ctx.summary_caches();
    if force {
        caches.invalidate(&ctx.scope)?;
    }
    let service = ctx.service()?;
    let cache = caches.get_or_build(service.as_ref(), &ctx.scope)?;
    eprintln!(
        "{} {} ({} clusters)",
        "wrote".green().bold(),
        caches.path_for(&ctx.scope).display().to_string().bold(),
        cache.len()
    );
    Ok(())
}
