//! yarn berry (v2+) lockfile.
//!
//! Plain YAML. Keys are comma-joined descriptors with an explicit protocol
//! (`a@npm:^1.0.0`), every block names its `resolution` locator. The
//! project root and workspace members appear as `name@workspace:<path>`
//! blocks; builtin and user patches as extra `name@patch:...` blocks next to
//! the patched package.

use crate::config::FormatOptions;
use crate::error::Error;
use crate::pkg::error::LockError;
use crate::pkg::graph::Resolution;
use crate::pkg::integrity::parse_integrity;
use crate::pkg::reference::{canonical_range, parse_reference, Protocol};
use crate::pkg::snapshot::{
    record_key, Dependencies, Manifest, PackageRecord, PatchInfo, Snapshot, Source, LOCAL_VERSION, ROOT_KEY,
};
use crate::pkg::spec::{name_end, Descriptor};
use crate::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;

const LABEL: &str = "yarn-berry";

const HEADER: &str = "# This file is generated by running \"yarn install\" inside your project.\n# Manual changes might be lost - proceed with caution!\n";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BerryEntry {
    version: Option<String>,
    resolution: String,
    #[serde(default)]
    dependencies: Dependencies,
    #[serde(default)]
    optional_dependencies: Dependencies,
    #[serde(default)]
    peer_dependencies: Dependencies,
    dependencies_meta: Option<Value>,
    peer_dependencies_meta: Option<Value>,
    bin: Option<Value>,
    checksum: Option<String>,
    conditions: Option<String>,
}

fn canonical_deps(deps: &Dependencies) -> Dependencies {
    deps.iter()
        .map(|(name, range)| (name.clone(), canonical_range(range).to_string()))
        .collect()
}

pub(super) fn parse(text: &str, manifest: Option<&Manifest>) -> Result<Snapshot> {
    let raw: serde_yaml::Mapping = serde_yaml::from_str(text).map_err(|e| Error::yaml(LABEL, e))?;

    let mut blocks = Vec::new();
    for (key, value) in raw {
        let Some(key) = key.as_str() else {
            return Err(LockError::invalid_lockfile(LABEL, "non-string entry key").into());
        };
        if key == "__metadata" {
            continue;
        }
        let entry: BerryEntry = serde_yaml::from_value(value).map_err(|e| Error::yaml(key, e))?;
        let descriptors = Descriptor::parse_list(key)?;
        blocks.push((key.to_string(), descriptors, entry));
    }

    let root_block = blocks
        .iter()
        .find(|(_, _, entry)| entry.resolution.ends_with("@workspace:."));
    let manifest = match (manifest, root_block) {
        (Some(manifest), _) => manifest.clone(),
        (None, Some((_, descriptors, entry))) => Manifest {
            name: descriptors.first().map(|d| d.name.clone()).unwrap_or_default(),
            dependencies: canonical_deps(&entry.dependencies),
            ..Manifest::default()
        },
        (None, None) => {
            return Err(LockError::invalid_manifest("no package.json and no root workspace entry").into())
        }
    };
    let mut snapshot = Snapshot::new(manifest);

    let (patches, plain): (Vec<_>, Vec<_>) = blocks
        .into_iter()
        .partition(|(_, _, entry)| entry.resolution.contains("@patch:"));

    for (key, descriptors, entry) in &plain {
        if entry.resolution.ends_with("@workspace:.") {
            continue;
        }
        let version = entry
            .version
            .clone()
            .ok_or_else(|| LockError::invalid_lockfile(LABEL, format!("{key} has no version")))?;

        for name in unique_names(descriptors) {
            let mut record = PackageRecord::new(name, version.clone(), parse_resolution(name, &entry.resolution)?);
            fill_record(&mut record, entry);
            for descriptor in descriptors.iter().filter(|d| d.name == name) {
                record.add_range(canonical_range(&descriptor.range));
            }
            snapshot.upsert(record);
        }
    }

    for (key, descriptors, entry) in patches {
        let version = entry
            .version
            .clone()
            .ok_or_else(|| LockError::invalid_lockfile(LABEL, format!("{key} has no version")))?;

        for name in unique_names(&descriptors) {
            let own: Vec<&Descriptor> = descriptors.iter().filter(|d| d.name == name).collect();
            let base_key = record_key(name, &version);

            if let Some(base) = snapshot.get_mut(&base_key) {
                base.patch = Some(PatchInfo {
                    resolution: entry.resolution.clone(),
                    descriptors: own.iter().map(|d| d.to_key()).collect(),
                    checksum: entry.checksum.clone(),
                });
                for descriptor in &own {
                    base.add_range(&descriptor.range);
                }
            } else {
                let mut record = PackageRecord::new(
                    name,
                    version.clone(),
                    Source::Patch {
                        locator: entry.resolution.clone(),
                    },
                );
                fill_record(&mut record, &entry);
                for descriptor in &own {
                    record.add_range(&descriptor.range);
                }
                snapshot.upsert(record);
            }
        }
    }

    Ok(snapshot)
}

fn unique_names(descriptors: &[Descriptor]) -> Vec<&str> {
    let mut names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names
}

fn fill_record(record: &mut PackageRecord, entry: &BerryEntry) {
    record.hashes = parse_integrity(entry.checksum.as_deref());
    record.dependencies = canonical_deps(&entry.dependencies);
    record.optional_dependencies = canonical_deps(&entry.optional_dependencies);
    record.peer_dependencies = canonical_deps(&entry.peer_dependencies);
    record.dependencies_meta.clone_from(&entry.dependencies_meta);
    record.peer_dependencies_meta.clone_from(&entry.peer_dependencies_meta);
    record.bin.clone_from(&entry.bin);
    record.conditions.clone_from(&entry.conditions);

    // optional dependencies live in `dependencies` and are flagged in the meta
    if let Some(Value::Object(meta)) = &entry.dependencies_meta {
        for (name, flags) in meta {
            if flags.get("optional").and_then(Value::as_bool) == Some(true) {
                if let Some(range) = record.dependencies.remove(name) {
                    record.optional_dependencies.insert(name.clone(), range);
                }
            }
        }
    }
}

/// Classify a `resolution` locator for the record installed as `name`.
fn parse_resolution(name: &str, resolution: &str) -> std::result::Result<Source, LockError> {
    let unsupported = || LockError::unsupported_resolution(resolution);
    let at = name_end(resolution).ok_or_else(unsupported)?;
    let (target, rest) = (&resolution[..at], &resolution[at + 1..]);

    if rest.starts_with("npm:") {
        return Ok(if target == name {
            Source::registry()
        } else {
            Source::Alias {
                target: target.to_string(),
                registry: None,
                hash: None,
            }
        });
    }

    if let Some(url) = rest.strip_prefix("https://") {
        if let Some((repo_url, commit)) = url.split_once(".git#commit=") {
            let (host, repo) = repo_url.split_once('/').ok_or_else(unsupported)?;
            return Ok(Source::Vcs {
                host: Some(host.to_string()),
                repo: repo.to_string(),
                commit: commit.to_string(),
            });
        }
        return Ok(Source::Tarball { url: rest.to_string() });
    }
    if rest.starts_with("http://") {
        return Ok(Source::Tarball { url: rest.to_string() });
    }

    let reference = parse_reference(rest);
    if reference.protocol.is_local() {
        // drop `::locator=...` bindings
        let path = reference.id.split("::").next().unwrap_or_default();
        return Ok(Source::Local {
            protocol: reference.protocol,
            path: path.to_string(),
        });
    }

    Err(unsupported())
}

fn format_resolution(record: &PackageRecord) -> String {
    let name = &record.name;
    match &record.source {
        Source::Registry { .. } => format!("{name}@npm:{}", record.version),
        Source::Alias { target, .. } => format!("{target}@npm:{}", record.version),
        Source::Vcs { host, repo, commit } => {
            let host = host.as_deref().unwrap_or("github.com");
            format!("{name}@https://{host}/{repo}.git#commit={commit}")
        }
        Source::Tarball { url } => format!("{name}@{url}"),
        Source::Local { protocol, path } => format!("{name}@{protocol}:{path}"),
        Source::Patch { locator } => locator.clone(),
    }
}

/// Descriptor range as written in a block key: registry ranges and tags
/// carry `npm:`, everything else is written as declared.
fn format_descriptor_range(range: &str, local: bool) -> String {
    match parse_reference(range).protocol {
        Protocol::Semver | Protocol::Tag if !local => format!("npm:{range}"),
        _ => range.to_string(),
    }
}

struct Block<'a> {
    record: &'a PackageRecord,
    resolution: String,
    checksum: Option<String>,
    dependencies: Dependencies,
}

pub(super) fn format(snapshot: &Snapshot, resolution: &Resolution, opts: &FormatOptions) -> Result<String> {
    let reachable = resolution.reachable();

    // resolution locator -> descriptors
    let mut grouped: BTreeMap<String, (Vec<String>, &PackageRecord)> = BTreeMap::new();
    for (key, record) in &snapshot.entries {
        if key == ROOT_KEY || !reachable.contains(key.as_str()) {
            continue;
        }
        let locator = format_resolution(record);
        let patched: &[String] = record
            .patch
            .as_ref()
            .map(|p| p.descriptors.as_slice())
            .unwrap_or_default();
        let group = grouped.entry(locator).or_insert_with(|| (Vec::new(), record));
        for range in &record.ranges {
            let descriptor = format!("{}@{}", record.name, format_descriptor_range(range, record.is_local()));
            if !patched.contains(&format!("{}@{range}", record.name)) {
                group.0.push(descriptor);
            }
        }
        if record.is_workspace_member() {
            if let Some(path) = record.source.local_path() {
                group.0.push(format!("{}@workspace:{path}", record.name));
            }
        }
    }

    let mut blocks: BTreeMap<String, Block<'_>> = BTreeMap::new();
    for (locator, (descriptors, record)) in grouped {
        let dependencies = merged_dependencies(record, false);
        if let Some(patch) = &record.patch {
            blocks.insert(
                block_key(patch.descriptors.clone()),
                Block {
                    record,
                    resolution: patch.resolution.clone(),
                    checksum: patch.checksum.clone(),
                    dependencies: dependencies.clone(),
                },
            );
        }
        blocks.insert(
            block_key(descriptors),
            Block {
                record,
                resolution: locator,
                checksum: record.hashes.get("checksum").cloned(),
                dependencies,
            },
        );
    }

    if let Some(root) = snapshot.root() {
        let locator = format!("{}@workspace:.", root.name);
        blocks.insert(
            block_key(vec![locator.clone()]),
            Block {
                record: root,
                resolution: locator,
                checksum: None,
                dependencies: merged_dependencies(root, true),
            },
        );
    }

    let mut out = String::from(HEADER);
    let _ = write!(
        out,
        "\n__metadata:\n  version: {}\n  cacheKey: {}\n",
        opts.berry_metadata_version, opts.berry_cache_key
    );
    for (key, block) in &blocks {
        let _ = writeln!(out, "\n{key}:");
        write_block(&mut out, block);
    }
    Ok(out)
}

fn block_key(mut descriptors: Vec<String>) -> String {
    descriptors.sort();
    descriptors.dedup();
    format!("\"{}\"", descriptors.join(", "))
}

/// Berry lists optional (and for the root, dev) dependencies inline.
fn merged_dependencies(record: &PackageRecord, as_root: bool) -> Dependencies {
    let mut out = record.dependencies.clone();
    let mut extra = vec![&record.optional_dependencies];
    if as_root {
        extra.push(&record.dev_dependencies);
    }
    for deps in extra {
        for (name, range) in deps {
            out.entry(name.clone()).or_insert_with(|| range.clone());
        }
    }
    out
}

fn dependencies_meta(record: &PackageRecord) -> Option<Value> {
    let mut meta = match &record.dependencies_meta {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    for name in record.optional_dependencies.keys() {
        let flags = meta
            .entry(name.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(flags) = flags {
            flags.insert("optional".into(), Value::Bool(true));
        }
    }
    (!meta.is_empty()).then_some(Value::Object(meta))
}

fn write_block(out: &mut String, block: &Block<'_>) {
    let record = block.record;
    let local = record.is_local();
    let version = if local { LOCAL_VERSION } else { record.version.as_str() };

    let _ = writeln!(out, "  version: {}", yaml_scalar(version));
    let _ = writeln!(out, "  resolution: \"{}\"", block.resolution);
    write_map(out, "dependencies", &block.dependencies);
    write_map(out, "peerDependencies", &record.peer_dependencies);
    if let Some(meta) = dependencies_meta(record) {
        write_value(out, 2, "dependenciesMeta", &meta);
    }
    if let Some(meta) = &record.peer_dependencies_meta {
        write_value(out, 2, "peerDependenciesMeta", meta);
    }
    if let Some(bin) = &record.bin {
        write_value(out, 2, "bin", bin);
    }
    if let Some(checksum) = &block.checksum {
        let _ = writeln!(out, "  checksum: {}", yaml_scalar(checksum));
    }
    if let Some(conditions) = &record.conditions {
        let _ = writeln!(out, "  conditions: {}", yaml_scalar(conditions));
    }
    let (language, link) = if local { ("unknown", "soft") } else { ("node", "hard") };
    let _ = writeln!(out, "  languageName: {language}\n  linkType: {link}");
}

fn write_map(out: &mut String, key: &str, deps: &Dependencies) {
    if deps.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {key}:");
    for (name, range) in deps {
        let _ = writeln!(out, "    {}: {}", yaml_scalar(name), yaml_scalar(range));
    }
}

fn write_value(out: &mut String, indent: usize, key: &str, value: &Value) {
    let pad = " ".repeat(indent);
    let key = yaml_scalar(key);
    match value {
        Value::Object(map) if !map.is_empty() => {
            let _ = writeln!(out, "{pad}{key}:");
            for (k, v) in map {
                write_value(out, indent + 2, k, v);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            let _ = writeln!(out, "{pad}{key}:");
            for item in items {
                let _ = writeln!(out, "{pad}  - {}", scalar_text(item));
            }
        }
        _ => {
            let _ = writeln!(out, "{pad}{key}: {}", scalar_text(value));
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => yaml_scalar(s),
        // flow style is valid YAML
        other => other.to_string(),
    }
}

/// Plain scalar when YAML reads it back as the same string, quoted
/// otherwise.
fn yaml_scalar(s: &str) -> String {
    const INDICATORS: &str = "@*&!|>'\"%#`[]{},?-: ";
    let plain = !s.is_empty()
        && !s.starts_with(|c: char| INDICATORS.contains(c))
        && !s.ends_with([' ', ':'])
        && !s.contains(": ")
        && !s.contains(" #")
        && !matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "false" | "null" | "~" | "yes" | "no" | "on" | "off"
        )
        && s.parse::<f64>().is_err();

    if plain {
        s.to_string()
    } else {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::formats::{format as format_as, parse as parse_as, Format};
    use crate::pkg::observe::NoObserver;

    const LOCK: &str = r#"# This file is generated by running "yarn install" inside your project.
# Manual changes might be lost - proceed with caution!

__metadata:
  version: 6
  cacheKey: 8

"a@npm:^1.0.0":
  version: 1.2.0
  resolution: "a@npm:1.2.0"
  dependencies:
    c: ^2.0.0
    fsevents: ~2.3.2
  dependenciesMeta:
    fsevents:
      optional: true
  checksum: aaa111
  languageName: node
  linkType: hard

"app@workspace:.":
  version: 0.0.0-use.local
  resolution: "app@workspace:."
  dependencies:
    a: ^1.0.0
    lib: workspace:*
    resolve: ^1.20.0
    sw: npm:string-width@^4.2.0
    throng: github:mixmaxhq/throng#master
  languageName: unknown
  linkType: soft

"c@npm:^2.0.0":
  version: 2.0.0
  resolution: "c@npm:2.0.0"
  checksum: ccc222
  languageName: node
  linkType: hard

"lib@workspace:*, lib@workspace:packages/lib":
  version: 0.0.0-use.local
  resolution: "lib@workspace:packages/lib"
  dependencies:
    c: ^2.0.0
  languageName: unknown
  linkType: soft

"resolve@npm:^1.20.0":
  version: 1.22.1
  resolution: "resolve@npm:1.22.1"
  bin:
    resolve: bin/resolve
  checksum: 07e179f4
  languageName: node
  linkType: hard

"resolve@patch:resolve@^1.20.0#~builtin<compat/resolve>":
  version: 1.22.1
  resolution: "resolve@patch:resolve@npm%3A1.22.1#~builtin<compat/resolve>::version=1.22.1&hash=07638b"
  bin:
    resolve: bin/resolve
  checksum: 5656f4d0
  languageName: node
  linkType: hard

"sw@npm:string-width@^4.2.0":
  version: 4.2.3
  resolution: "string-width@npm:4.2.3"
  checksum: e52c10dc
  languageName: node
  linkType: hard

"throng@github:mixmaxhq/throng#master":
  version: 4.0.0
  resolution: "throng@https://github.com/mixmaxhq/throng.git#commit=8a015a378c2c0db0c760b2147b2468a1c1e86edf"
  languageName: node
  linkType: hard
"#;

    #[test]
    fn test_parse_entries() {
        let snap = parse_as(Format::YarnBerry, LOCK, None).unwrap();

        assert_eq!(snap.manifest.name, "app");
        assert_eq!(snap.root().unwrap().dependencies["a"], "^1.0.0");

        let a = snap.get("a@1.2.0").unwrap();
        assert!(a.ranges.contains("^1.0.0"));
        assert_eq!(a.dependencies.get("fsevents"), None);
        assert_eq!(a.optional_dependencies["fsevents"], "~2.3.2");
        assert_eq!(a.hashes["checksum"], "aaa111");

        let lib = snap.get("lib@0.0.0-use.local").unwrap();
        assert_eq!(lib.source, Source::workspace("packages/lib"));
        assert!(lib.ranges.contains("workspace:*"));

        let sw = snap.get("sw@4.2.3").unwrap();
        assert!(sw.ranges.contains("npm:string-width@^4.2.0"));
        assert!(matches!(&sw.source, Source::Alias { target, .. } if target == "string-width"));

        let throng = snap.get("throng@4.0.0").unwrap();
        assert_eq!(
            throng.source,
            Source::Vcs {
                host: Some("github.com".into()),
                repo: "mixmaxhq/throng".into(),
                commit: "8a015a378c2c0db0c760b2147b2468a1c1e86edf".into(),
            }
        );

        let resolve = snap.get("resolve@1.22.1").unwrap();
        let patch = resolve.patch.as_ref().unwrap();
        assert_eq!(patch.descriptors, vec!["resolve@patch:resolve@^1.20.0#~builtin<compat/resolve>".to_string()]);
        assert_eq!(patch.checksum.as_deref(), Some("5656f4d0"));
        assert!(snap.get("app@0.0.0-use.local").is_none());
    }

    #[test]
    fn test_format_reproduces_lockfile() {
        let snap = parse_as(Format::YarnBerry, LOCK, None).unwrap();
        let text = format_as(Format::YarnBerry, &snap, &FormatOptions::default(), &NoObserver).unwrap();
        assert_eq!(text, LOCK);
    }

    #[test]
    fn test_metadata_from_options() {
        let snap = parse_as(Format::YarnBerry, LOCK, None).unwrap();
        let opts = FormatOptions {
            berry_metadata_version: 8,
            berry_cache_key: "10c0".into(),
            ..FormatOptions::default()
        };
        let text = format_as(Format::YarnBerry, &snap, &opts, &NoObserver).unwrap();
        assert!(text.contains("\n__metadata:\n  version: 8\n  cacheKey: 10c0\n"));
    }

    #[test]
    fn test_patch_without_base_keeps_locator() {
        let lock = r#"__metadata:
  version: 6

"app@workspace:.":
  version: 0.0.0-use.local
  resolution: "app@workspace:."
  dependencies:
    x: "patch:x@npm%3A1.0.0#./x.patch"
  languageName: unknown
  linkType: soft

"x@patch:x@npm%3A1.0.0#./x.patch::locator=app%40workspace%3A.":
  version: 1.0.0
  resolution: "x@patch:x@npm%3A1.0.0#./x.patch::version=1.0.0&hash=abc&locator=app%40workspace%3A."
  languageName: node
  linkType: hard
"#;
        let snap = parse_as(Format::YarnBerry, lock, None).unwrap();
        let x = snap.get("x@1.0.0").unwrap();
        assert!(matches!(&x.source, Source::Patch { locator } if locator.starts_with("x@patch:")));
    }

    #[test]
    fn test_unknown_resolution_is_rejected() {
        let err = parse_resolution("x", "x@exec:./build.js").unwrap_err();
        assert_eq!(err.code(), "LOCK_UNSUPPORTED_RESOLUTION");
    }

    #[test]
    fn test_yaml_scalar_quoting() {
        assert_eq!(yaml_scalar("^1.0.0"), "^1.0.0");
        assert_eq!(yaml_scalar("npm:^1.0.0"), "npm:^1.0.0");
        assert_eq!(yaml_scalar("@babel/core"), "\"@babel/core\"");
        assert_eq!(yaml_scalar("*"), "\"*\"");
        assert_eq!(yaml_scalar(">= 2.1.2 < 3"), "\">= 2.1.2 < 3\"");
        assert_eq!(yaml_scalar("1.5"), "\"1.5\"");
        assert_eq!(yaml_scalar("true"), "\"true\"");
        assert_eq!(yaml_scalar("1.2.0"), "1.2.0");
    }
}
