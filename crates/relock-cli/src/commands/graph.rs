use super::{fail, print_json, Input, TracingObserver};
use miette::Result;
use relock_core::pkg::{analyze, Analysis, Format, PlacementKind, Snapshot};
use relock_core::Config;
use tracing::info;

/// `relock graph`: resolve and project a lockfile, then summarize.
pub fn run(config: &Config, input: &Input, full: bool, json: bool) -> Result<()> {
    let observer = TracingObserver::new(config);

    let analyzed = input.load(config, &observer).and_then(|loaded| {
        let analysis = analyze(&loaded.snapshot, &observer)?;
        Ok((loaded, analysis))
    });
    let (loaded, analysis) = match analyzed {
        Ok(pair) => pair,
        Err(e) => return fail(&e, json),
    };

    info!(
        lockfile = %loaded.path.display(),
        tree = analysis.resolution.tree.len(),
        placements = analysis.placement.len(),
        "analyzed lockfile"
    );

    if json {
        let mut result = serde_json::json!({
            "ok": true,
            "graph": summary(loaded.format, &loaded.snapshot, &analysis),
        });
        if full {
            result["analysis"] = serde_json::to_value(&analysis).unwrap_or_default();
        }
        print_json(&result);
    } else {
        print_human(loaded.format, &loaded.snapshot, &analysis);
    }

    Ok(())
}

fn summary(format: Option<Format>, snapshot: &Snapshot, analysis: &Analysis) -> serde_json::Value {
    serde_json::json!({
        "format": format.map(Format::as_str),
        "records": snapshot.len(),
        "roots": analysis.resolution.roots,
        "tree_entries": analysis.resolution.tree.len(),
        "edges": analysis.resolution.edges.len(),
        "production": analysis.resolution.production.len(),
        "placements": analysis.placement.len(),
        "orphans": snapshot.orphans(),
        "unsatisfied": analysis.resolution.unsatisfied,
        "digest": analysis.digest,
    })
}

fn print_human(format: Option<Format>, snapshot: &Snapshot, analysis: &Analysis) {
    let resolution = &analysis.resolution;
    println!("format:       {}", format.map_or("unknown", Format::as_str));
    println!("records:      {}", snapshot.len());
    println!("tree entries: {}", resolution.tree.len());
    println!("edges:        {}", resolution.edges.len());
    println!("production:   {}", resolution.production.len());
    println!("placements:   {}", analysis.placement.len());
    println!("digest:       {}", analysis.digest);

    if !analysis.placement.is_empty() {
        println!("\nnode_modules:");
        for (path, placed) in &analysis.placement.entries {
            let mut tags = Vec::new();
            match placed.kind {
                PlacementKind::Package => {}
                PlacementKind::Link => tags.push("link"),
                PlacementKind::Workspace => tags.push("workspace"),
            }
            if placed.dev {
                tags.push("dev");
            }
            if tags.is_empty() {
                println!("  {path} -> {}", placed.key);
            } else {
                println!("  {path} -> {} ({})", placed.key, tags.join(", "));
            }
        }
    }

    if !resolution.unsatisfied.is_empty() {
        println!("\nOutside declared range:");
        for u in &resolution.unsatisfied {
            let from = if u.from.is_empty() { "(root)" } else { u.from.as_str() };
            println!("  {from}: {}@{} -> {}", u.name, u.range, u.to);
        }
    }

    let orphans = snapshot.orphans();
    if !orphans.is_empty() {
        println!("\nOrphans:");
        for key in orphans {
            println!("  {key}");
        }
    }
}
