//! npm lockfile v1: the nested `dependencies` tree.
//!
//! Nesting mirrors `node_modules`: an entry's own `dependencies` are the
//! packages installed below it, `requires` lists what it declares. The
//! root manifest is not part of the file and has to be supplied.
//!
//! `"version": "npm:<target>@<v>"` marks an alias and `"version":
//! "file:<dir>"` a link to a local directory; packages nested under a link
//! are installed in the linked directory.

use super::npm3::{header, to_text, to_value};
use super::{format_resolved, source_from_resolved, sri_integrity, ResolvedStyle};
use crate::config::FormatOptions;
use crate::error::Error;
use crate::pkg::error::LockError;
use crate::pkg::hoist::{installed_name, invert, lookup_dirs, nm_path, PhysicalNode, Placement, PlacementKind};
use crate::pkg::integrity::parse_integrity;
use crate::pkg::snapshot::{Dependencies, Manifest, PackageRecord, Snapshot, Source, LOCAL_VERSION, ROOT_KEY};
use crate::pkg::spec::name_end;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeMap;

const LABEL: &str = "npm-1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct Npm1Entry {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requires: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Npm1Entry>,
}

#[derive(Debug, Deserialize)]
struct Npm1Lockfile {
    #[serde(default)]
    dependencies: BTreeMap<String, Npm1Entry>,
}

pub(super) fn parse(text: &str, manifest: Option<&Manifest>) -> Result<Snapshot> {
    let lockfile: Npm1Lockfile = serde_json::from_str(text).map_err(|e| Error::json(LABEL, e))?;
    parse_dependencies(LABEL, &lockfile.dependencies, manifest)
}

/// Build a snapshot from a v1 `dependencies` tree.
pub(super) fn parse_dependencies(
    label: &'static str,
    dependencies: &BTreeMap<String, Npm1Entry>,
    manifest: Option<&Manifest>,
) -> Result<Snapshot> {
    let manifest = manifest.ok_or_else(|| {
        LockError::invalid_manifest(format!("{label} lockfiles need the project's package.json"))
    })?;
    let mut snapshot = Snapshot::new(manifest.clone());

    let mut nodes = BTreeMap::new();
    if let Some(root) = snapshot.root() {
        nodes.insert(String::new(), PhysicalNode::Package(root.clone()));
    }

    let mut stack: Vec<(String, &str, &Npm1Entry)> = dependencies
        .iter()
        .map(|(name, entry)| (String::new(), name.as_str(), entry))
        .collect();

    while let Some((dir, name, entry)) = stack.pop() {
        let path = nm_path(&dir, name);

        let child_dir = if let Some(target) = entry.version.strip_prefix("file:") {
            let target = target.strip_prefix("./").unwrap_or(target).to_string();
            nodes.insert(path, PhysicalNode::Link { target: target.clone() });
            nodes.entry(target.clone()).or_insert_with(|| {
                let mut record = PackageRecord::new(name, LOCAL_VERSION, Source::workspace(target.clone()));
                record.dependencies = declared(entry);
                PhysicalNode::Package(record)
            });
            target
        } else {
            nodes.insert(path.clone(), PhysicalNode::Package(record_of(label, name, entry)?));
            path
        };

        for (child, child_entry) in &entry.dependencies {
            stack.push((child_dir.clone(), child.as_str(), child_entry));
        }
    }

    let inverted = invert(&nodes)?;
    for (key, record) in inverted.entries {
        if key != ROOT_KEY {
            snapshot.entries.insert(key, record);
        }
    }
    Ok(snapshot)
}

/// `requires`, or the versions of the nested entries when it is absent.
fn declared(entry: &Npm1Entry) -> Dependencies {
    if !entry.requires.is_empty() {
        return entry.requires.clone();
    }
    entry
        .dependencies
        .iter()
        .map(|(name, nested)| (name.clone(), nested.version.clone()))
        .collect()
}

fn record_of(label: &'static str, name: &str, entry: &Npm1Entry) -> Result<PackageRecord> {
    if entry.version.is_empty() {
        return Err(LockError::invalid_lockfile(label, format!("{name} has no version")).into());
    }

    let (version, alias) = match entry.version.strip_prefix("npm:") {
        Some(rest) => {
            let at = name_end(rest).ok_or_else(|| {
                LockError::invalid_lockfile(label, format!("bad alias version {}", entry.version))
            })?;
            (rest[at + 1..].to_string(), Some(rest[..at].to_string()))
        }
        None => (entry.version.clone(), None),
    };

    let mut source = source_from_resolved(name, entry.resolved.as_deref())?;
    if let (Some(target), Source::Registry { registry, hash }) = (alias, &source) {
        source = Source::Alias {
            target,
            registry: registry.clone(),
            hash: hash.clone(),
        };
    }

    let mut record = PackageRecord::new(name, version, source);
    record.hashes = parse_integrity(entry.integrity.as_deref());
    record.dependencies = declared(entry);
    Ok(record)
}

/// Build the v1 `dependencies` tree from a placement.
pub(super) fn format_dependencies(
    snapshot: &Snapshot,
    placement: &Placement,
    opts: &FormatOptions,
) -> Result<BTreeMap<String, Npm1Entry>> {
    let workspaces: Vec<(&str, String)> = placement
        .entries
        .iter()
        .filter(|(_, p)| p.kind == PlacementKind::Workspace)
        .filter_map(|(dir, p)| {
            let record = snapshot.get(&p.key)?;
            Some((dir.as_str(), nm_path("", &record.name)))
        })
        .collect();

    let mut flat: BTreeMap<String, Npm1Entry> = BTreeMap::new();
    for (path, placed) in &placement.entries {
        let record = snapshot
            .get(&placed.key)
            .ok_or_else(|| LockError::inconsistent(&placed.key, ""))?;

        let entry = match placed.kind {
            PlacementKind::Workspace => continue,
            PlacementKind::Link => Npm1Entry {
                version: format!("file:{}", record.source.local_path().unwrap_or_default()),
                requires: requires(record),
                ..Npm1Entry::default()
            },
            PlacementKind::Package => Npm1Entry {
                version: match &record.source {
                    Source::Alias { target, .. } => format!("npm:{target}@{}", record.version),
                    _ => record.version.clone(),
                },
                resolved: format_resolved(record, &opts.npm_registry, ResolvedStyle::Npm1),
                integrity: sri_integrity(record),
                dev: placed.dev,
                requires: requires(record),
                ..Npm1Entry::default()
            },
        };

        // packages installed in a linked directory nest under the link
        let path = workspaces
            .iter()
            .find_map(|(dir, link)| {
                path.strip_prefix(dir)
                    .filter(|rest| rest.starts_with("/node_modules/"))
                    .map(|rest| format!("{link}{rest}"))
            })
            .unwrap_or_else(|| path.clone());
        flat.insert(path, entry);
    }

    let mut paths: Vec<String> = flat.keys().cloned().collect();
    paths.sort_by_key(|p| Reverse(p.matches("node_modules/").count()));

    let mut top = BTreeMap::new();
    for path in paths {
        let Some(entry) = flat.remove(&path) else {
            continue;
        };
        let name = installed_name(&path)
            .ok_or_else(|| LockError::malformed(&path))?
            .to_string();
        let parent = lookup_dirs(&path).into_iter().nth(1).unwrap_or_default();
        if parent.is_empty() {
            top.insert(name, entry);
        } else {
            flat.get_mut(&parent)
                .ok_or_else(|| LockError::malformed(&path))?
                .dependencies
                .insert(name, entry);
        }
    }

    Ok(top)
}

fn requires(record: &PackageRecord) -> Dependencies {
    let mut out = record.dependencies.clone();
    for (name, range) in &record.optional_dependencies {
        out.entry(name.clone()).or_insert_with(|| range.clone());
    }
    out
}

pub(super) fn format(snapshot: &Snapshot, placement: &Placement, opts: &FormatOptions) -> Result<String> {
    let mut out = header(snapshot, 1);
    let dependencies = format_dependencies(snapshot, placement, opts)?;
    out.insert("dependencies".into(), to_value(&dependencies)?);
    to_text(&Value::Object(out))
}
