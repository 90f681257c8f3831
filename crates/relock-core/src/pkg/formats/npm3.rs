//! npm lockfile v3: the flat `packages` table.
//!
//! ```json
//! {
//!   "name": "app",
//!   "lockfileVersion": 3,
//!   "requires": true,
//!   "packages": {
//!     "": { "name": "app", "dependencies": { "a": "^1.0.0" } },
//!     "node_modules/a": { "version": "1.0.0", "resolved": "...", "integrity": "..." },
//!     "node_modules/a/node_modules/b": { "version": "2.0.0" },
//!     "node_modules/lib": { "resolved": "packages/lib", "link": true },
//!     "packages/lib": { "name": "lib", "version": "0.1.0" }
//!   }
//! }
//! ```
//!
//! Lockfile v2 carries the same table next to the v1 `dependencies` tree.

use super::{format_resolved, source_from_resolved, sri_integrity, ResolvedStyle};
use crate::config::FormatOptions;
use crate::error::Error;
use crate::pkg::error::LockError;
use crate::pkg::hoist::{installed_name, invert, is_root_dir, PhysicalNode, Placement, PlacementKind};
use crate::pkg::integrity::parse_integrity;
use crate::pkg::snapshot::{
    Dependencies, Manifest, PackageRecord, Snapshot, Source, LOCAL_VERSION, ROOT_KEY,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const LABEL: &str = "npm-3";

/// One entry of the `packages` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NpmPackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub link: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_dependencies_meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engines: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// Top level of an npm v2/v3 lockfile.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PackagesLockfile {
    #[serde(default)]
    pub packages: BTreeMap<String, Value>,
}

pub(super) fn parse(text: &str, manifest: Option<&Manifest>) -> Result<Snapshot> {
    let lockfile: PackagesLockfile =
        serde_json::from_str(text).map_err(|e| Error::json(LABEL, e))?;
    parse_packages(LABEL, &lockfile.packages, manifest)
}

/// Build a snapshot from a `packages` table.
///
/// The `""` entry is the root manifest unless `manifest` is given.
pub(super) fn parse_packages(
    label: &'static str,
    packages: &BTreeMap<String, Value>,
    manifest: Option<&Manifest>,
) -> Result<Snapshot> {
    let manifest = match (manifest, packages.get("")) {
        (Some(manifest), _) => manifest.clone(),
        (None, Some(root)) => {
            serde_json::from_value(root.clone()).map_err(|e| Error::json(label, e))?
        }
        (None, None) => {
            return Err(LockError::invalid_lockfile(label, "missing root package \"\"").into())
        }
    };
    let mut snapshot = Snapshot::new(manifest);

    let mut nodes = BTreeMap::new();
    if let Some(root) = snapshot.root() {
        nodes.insert(String::new(), PhysicalNode::Package(root.clone()));
    }

    for (path, value) in packages {
        if path.is_empty() {
            continue;
        }
        let entry: NpmPackage =
            serde_json::from_value(value.clone()).map_err(|e| Error::json(label, e))?;
        nodes.insert(path.clone(), physical_node(label, path, entry)?);
    }

    let inverted = invert(&nodes)?;
    for (key, record) in inverted.entries {
        if key != ROOT_KEY {
            snapshot.entries.insert(key, record);
        }
    }

    Ok(snapshot)
}

fn physical_node(label: &'static str, path: &str, entry: NpmPackage) -> Result<PhysicalNode> {
    if entry.link {
        let target = entry
            .resolved
            .ok_or_else(|| LockError::invalid_lockfile(label, format!("link {path} has no target")))?;
        return Ok(PhysicalNode::Link { target });
    }

    let record = if is_root_dir(path) {
        let name = entry
            .name
            .clone()
            .or_else(|| path.rsplit('/').next().map(String::from))
            .unwrap_or_default();
        let version = entry.version.clone().unwrap_or_else(|| LOCAL_VERSION.to_string());
        fill_record(PackageRecord::new(name, version, Source::workspace(path)), entry)
    } else {
        let name = installed_name(path)
            .ok_or_else(|| LockError::malformed(path))?
            .to_string();
        let version = entry
            .version
            .clone()
            .ok_or_else(|| LockError::invalid_lockfile(label, format!("{path} has no version")))?;
        let mut source = source_from_resolved(&name, entry.resolved.as_deref())?;
        // `name` differs from the folder name only for aliases
        if let (Source::Registry { registry, hash }, Some(target)) = (&source, &entry.name) {
            if *target != name {
                source = Source::Alias {
                    target: target.clone(),
                    registry: registry.clone(),
                    hash: hash.clone(),
                };
            }
        }
        fill_record(PackageRecord::new(name, version, source), entry)
    };

    Ok(PhysicalNode::Package(record))
}

fn fill_record(mut record: PackageRecord, entry: NpmPackage) -> PackageRecord {
    record.hashes = parse_integrity(entry.integrity.as_deref());
    record.dependencies = entry.dependencies;
    record.dev_dependencies = entry.dev_dependencies;
    record.optional_dependencies = entry.optional_dependencies;
    record.peer_dependencies = entry.peer_dependencies;
    record.peer_dependencies_meta = entry.peer_dependencies_meta;
    record.bin = entry.bin;
    record.engines = entry.engines;
    record.funding = entry.funding;
    record.license = entry.license;
    record
}

/// Top-level fields shared by v1, v2 and v3 writers.
pub(super) fn header(snapshot: &Snapshot, version: u8) -> serde_json::Map<String, Value> {
    let mut out = serde_json::Map::new();
    out.insert("name".into(), Value::String(snapshot.manifest.name.clone()));
    if let Some(v) = &snapshot.manifest.version {
        out.insert("version".into(), Value::String(v.clone()));
    }
    out.insert("lockfileVersion".into(), Value::from(version));
    out.insert("requires".into(), Value::Bool(true));
    out
}

/// Build the `packages` table from a placement.
pub(super) fn format_packages(
    snapshot: &Snapshot,
    placement: &Placement,
    opts: &FormatOptions,
) -> Result<BTreeMap<String, Value>> {
    let mut packages = BTreeMap::new();
    packages.insert(String::new(), to_value(&snapshot.manifest)?);

    for (path, placed) in &placement.entries {
        let record = snapshot
            .get(&placed.key)
            .ok_or_else(|| LockError::inconsistent(&placed.key, ""))?;

        let entry = match placed.kind {
            PlacementKind::Link => NpmPackage {
                resolved: record.source.local_path().map(String::from),
                link: true,
                ..NpmPackage::default()
            },
            PlacementKind::Workspace => NpmPackage {
                name: Some(record.name.clone()),
                version: (record.version != LOCAL_VERSION).then(|| record.version.clone()),
                dependencies: record.dependencies.clone(),
                dev_dependencies: record.dev_dependencies.clone(),
                optional_dependencies: record.optional_dependencies.clone(),
                peer_dependencies: record.peer_dependencies.clone(),
                bin: record.bin.clone(),
                engines: record.engines.clone(),
                license: record.license.clone(),
                ..NpmPackage::default()
            },
            PlacementKind::Package => NpmPackage {
                name: match &record.source {
                    Source::Alias { target, .. } => Some(target.clone()),
                    _ => None,
                },
                version: Some(record.version.clone()),
                resolved: format_resolved(record, &opts.npm_registry, ResolvedStyle::Npm3),
                integrity: sri_integrity(record),
                dev: placed.dev,
                dependencies: record.dependencies.clone(),
                optional_dependencies: record.optional_dependencies.clone(),
                peer_dependencies: record.peer_dependencies.clone(),
                peer_dependencies_meta: record.peer_dependencies_meta.clone(),
                bin: record.bin.clone(),
                engines: record.engines.clone(),
                funding: record.funding.clone(),
                license: record.license.clone(),
                ..NpmPackage::default()
            },
        };
        packages.insert(path.clone(), to_value(&entry)?);
    }

    Ok(packages)
}

pub(super) fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::json(LABEL, e))
}

pub(super) fn to_text(value: &Value) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value).map_err(|e| Error::json(LABEL, e))?;
    text.push('\n');
    Ok(text)
}

pub(super) fn format(snapshot: &Snapshot, placement: &Placement, opts: &FormatOptions) -> Result<String> {
    let mut out = header(snapshot, 3);
    let packages = format_packages(snapshot, placement, opts)?;
    out.insert("packages".into(), to_value(&packages)?);
    to_text(&Value::Object(out))
}
