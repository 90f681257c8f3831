//! yarn v1 lockfile.
//!
//! ```text
//! # THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
//! # yarn lockfile v1
//!
//!
//! "@babel/code-frame@^7.0.0", "@babel/code-frame@^7.12.13":
//!   version "7.12.13"
//!   resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.12.13.tgz#dcfc826b..."
//!   integrity sha512-HV1Cm0Q3ZrpCR93tkWOYiuYIgLxZXZFVG2VgK+MBWjUqZTundupbfx2aXarXuw5Ko5aMcjtJgbSs4vUGBS5v6g==
//!   dependencies:
//!     "@babel/highlight" "^7.12.13"
//! ```
//!
//! Not YAML, so it gets its own line scanner. Entries sharing a `resolved`
//! URL share one block; the block key lists every descriptor that selects
//! it.

use super::{format_resolved, source_from_resolved, sri_integrity, ResolvedStyle};
use crate::config::FormatOptions;
use crate::pkg::error::LockError;
use crate::pkg::graph::Resolution;
use crate::pkg::integrity::parse_integrity;
use crate::pkg::reference::parse_reference;
use crate::pkg::snapshot::{Dependencies, Manifest, PackageRecord, Snapshot, Source, ROOT_KEY};
use crate::pkg::spec::Descriptor;
use crate::Result;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const LABEL: &str = "yarn-classic";

const HEADER: &str = "# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.\n# yarn lockfile v1\n\n";

/// One `key:` block with its scalar fields and nested maps.
#[derive(Debug, Default)]
struct Block {
    descriptors: Vec<Descriptor>,
    fields: BTreeMap<String, String>,
    sections: BTreeMap<String, Dependencies>,
}

fn parse_blocks(text: &str) -> std::result::Result<Vec<Block>, LockError> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut section: Option<String> = None;

    for (n, line) in text.lines().enumerate() {
        let content = line.trim();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }
        let at = |message: &str| LockError::invalid_lockfile(LABEL, format!("line {}: {message}", n + 1));
        let indent = line.len() - line.trim_start().len();

        if indent == 0 {
            let key = content
                .strip_suffix(':')
                .ok_or_else(|| at("expected ':' after entry key"))?;
            blocks.push(Block {
                descriptors: Descriptor::parse_list(key)?,
                ..Block::default()
            });
            section = None;
            continue;
        }

        let block = blocks
            .last_mut()
            .ok_or_else(|| at("field outside of an entry"))?;

        if indent <= 2 {
            if let Some(name) = content.strip_suffix(':') {
                let name = unquote(name);
                block.sections.entry(name.clone()).or_default();
                section = Some(name);
            } else {
                let (key, value) = split_pair(content).ok_or_else(|| at("expected 'key value'"))?;
                block.fields.insert(key, value);
                section = None;
            }
        } else {
            let name = section.as_ref().ok_or_else(|| at("unexpected indentation"))?;
            let (key, value) = split_pair(content).ok_or_else(|| at("expected 'name range'"))?;
            block.sections.entry(name.clone()).or_default().insert(key, value);
        }
    }

    Ok(blocks)
}

fn split_pair(content: &str) -> Option<(String, String)> {
    let (key, rest) = match content.strip_prefix('"') {
        Some(quoted) => {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        }
        None => content.split_once(char::is_whitespace)?,
    };
    Some((key.to_string(), unquote(rest.trim())))
}

fn unquote(s: &str) -> String {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map_or_else(|| s.to_string(), |inner| inner.replace("\\\"", "\""))
}

pub(super) fn parse(text: &str, manifest: Option<&Manifest>) -> Result<Snapshot> {
    let manifest = manifest.ok_or_else(|| {
        LockError::invalid_manifest(format!("{LABEL} lockfiles need the project's package.json"))
    })?;
    let mut snapshot = Snapshot::new(manifest.clone());

    for block in parse_blocks(text)? {
        let version = block.fields.get("version").ok_or_else(|| {
            let key = block.descriptors.first().map(Descriptor::to_key).unwrap_or_default();
            LockError::invalid_lockfile(LABEL, format!("{key} has no version"))
        })?;

        let mut by_name: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for descriptor in &block.descriptors {
            by_name
                .entry(descriptor.name.as_str())
                .or_default()
                .push(descriptor.range.as_str());
        }

        for (name, ranges) in by_name {
            let source = match block.fields.get("resolved") {
                Some(resolved) => source_from_resolved(name, Some(resolved))?,
                None => local_source(&ranges).unwrap_or_else(Source::registry),
            };

            let mut record = PackageRecord::new(name, version.clone(), source);
            record.hashes = parse_integrity(block.fields.get("integrity").map(String::as_str));
            if let Some(deps) = block.sections.get("dependencies") {
                record.dependencies.clone_from(deps);
            }
            if let Some(deps) = block.sections.get("optionalDependencies") {
                record.optional_dependencies.clone_from(deps);
            }
            for range in ranges {
                record.add_range(range);
            }
            snapshot.upsert(record);
        }
    }

    Ok(snapshot)
}

/// `file:` and `link:` entries carry no `resolved`; the path is the range.
fn local_source(ranges: &[&str]) -> Option<Source> {
    ranges.iter().find_map(|range| {
        let reference = parse_reference(range);
        reference.protocol.is_local().then(|| Source::Local {
            protocol: reference.protocol,
            path: reference.id,
        })
    })
}

pub(super) fn format(snapshot: &Snapshot, resolution: &Resolution, opts: &FormatOptions) -> Result<String> {
    let reachable = resolution.reachable();

    // resolved URL -> (descriptors, record)
    let mut groups: BTreeMap<String, (Vec<String>, &PackageRecord)> = BTreeMap::new();
    for (key, record) in &snapshot.entries {
        if key == ROOT_KEY || !reachable.contains(key.as_str()) {
            continue;
        }
        let resolved = resolved_of(record, &opts.yarn_registry)?;
        let group = groups
            .entry(resolved)
            .or_insert_with(|| (Vec::new(), record));
        group
            .0
            .extend(record.ranges.iter().map(|range| format!("{}@{range}", record.name)));
    }

    let mut blocks: Vec<(String, String, &PackageRecord)> = groups
        .into_iter()
        .map(|(resolved, (mut descriptors, record))| {
            descriptors.sort();
            descriptors.dedup();
            let key = descriptors
                .iter()
                .map(|d| quote_if_needed(d))
                .collect::<Vec<_>>()
                .join(", ");
            (key, resolved, record)
        })
        .collect();
    blocks.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::from(HEADER);
    for (key, resolved, record) in blocks {
        let _ = writeln!(out, "\n{key}:");
        let _ = writeln!(out, "  version {}", quote(&record.version));
        let _ = writeln!(out, "  resolved {}", quote(&resolved));
        if let Some(integrity) = sri_integrity(record) {
            let _ = writeln!(out, "  integrity {integrity}");
        }
        write_section(&mut out, "dependencies", &record.dependencies);
        write_section(&mut out, "optionalDependencies", &record.optional_dependencies);
    }

    Ok(out)
}

fn resolved_of(record: &PackageRecord, registry: &str) -> std::result::Result<String, LockError> {
    match &record.source {
        Source::Local { protocol, path } => Ok(format!("{protocol}:{path}")),
        Source::Patch { locator } => Err(LockError::unsupported_resolution(locator.clone())),
        _ => format_resolved(record, registry, ResolvedStyle::YarnClassic)
            .ok_or_else(|| LockError::unsupported_resolution(record.key())),
    }
}

fn write_section(out: &mut String, name: &str, deps: &Dependencies) {
    if deps.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {name}:");
    for (dep, range) in deps {
        let _ = writeln!(out, "    {} {}", quote_if_needed(dep), quote(range));
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

fn quote_if_needed(s: &str) -> String {
    if s.starts_with('@') || s.contains([' ', ':', ',']) {
        quote(s)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::formats::{format as format_as, parse as parse_as, Format};
    use crate::pkg::observe::NoObserver;
    use crate::pkg::reference::Protocol;

    const MANIFEST: &str = r#"{
        "name": "app",
        "version": "1.0.0",
        "dependencies": {
            "@babel/code-frame": "^7.12.13",
            "string-width": "^4.2.0",
            "sw": "npm:string-width@^4.2.0",
            "throng": "mixmaxhq/throng#master"
        },
        "devDependencies": { "js-tokens": "^4.0.0", "lib": "file:./lib" }
    }"#;

    const LOCK: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@babel/code-frame@^7.0.0", "@babel/code-frame@^7.12.13":
  version "7.12.13"
  resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.12.13.tgz#dcfc826beef65e75c50e21d3837d7d95798dd658"
  integrity sha512-HV1Cm0Q3ZrpCR93tkWOYiuYIgLxZXZFVG2VgK+MBWjUqZTundupbfx2aXarXuw5Ko5aMcjtJgbSs4vUGBS5v6g==
  dependencies:
    js-tokens "^4.0.0"

js-tokens@^4.0.0:
  version "4.0.0"
  resolved "https://registry.yarnpkg.com/js-tokens/-/js-tokens-4.0.0.tgz#19203fb59991df98e3a287050d4647cdeaf32499"
  integrity sha512-RdJUflcE3cUzKiMqQgsCu06FPu9UdIJO0beYbPhHN4k6apgJtifcoCtT9bcxOpYBtpD2kCM6Sbzg4CausW/PKQ==

lib@file:./lib:
  version "0.1.0"

"string-width@^4.2.0", "sw@npm:string-width@^4.2.0":
  version "4.2.3"
  resolved "https://registry.yarnpkg.com/string-width/-/string-width-4.2.3.tgz#269c7117d27b05ad2e536830a8ec895ef9c6d010"
  integrity sha512-wKyQRQpjJ0sIp62ErSZdGsjMJWsap5oRNihHhu6G7JVO/9jIB6UyevL+tXuOqrng8j/cxKTWyWUwvSTriiZz/g==
  optionalDependencies:
    fsevents "~2.3.2"

"throng@mixmaxhq/throng#master":
  version "4.0.0"
  resolved "https://codeload.github.com/mixmaxhq/throng/tar.gz/8a015a378c2c0db0c760b2147b2468a1c1e86edf"
"#;

    fn manifest() -> Manifest {
        Manifest::from_json(MANIFEST).unwrap()
    }

    #[test]
    fn test_parse_blocks() {
        let snap = parse_as(Format::YarnClassic, LOCK, Some(&manifest())).unwrap();

        let frame = snap.get("@babel/code-frame@7.12.13").unwrap();
        assert_eq!(frame.ranges.len(), 2);
        assert_eq!(frame.dependencies["js-tokens"], "^4.0.0");
        assert_eq!(
            frame.source,
            Source::Registry {
                registry: None,
                hash: Some("dcfc826beef65e75c50e21d3837d7d95798dd658".into())
            }
        );

        let sw = snap.get("sw@4.2.3").unwrap();
        assert!(sw.ranges.contains("npm:string-width@^4.2.0"));
        assert!(matches!(&sw.source, Source::Alias { target, .. } if target == "string-width"));
        assert_eq!(sw.optional_dependencies["fsevents"], "~2.3.2");
        assert!(snap.get("string-width@4.2.3").unwrap().ranges.contains("^4.2.0"));

        let throng = snap.get("throng@4.0.0").unwrap();
        assert!(matches!(&throng.source, Source::Vcs { repo, .. } if repo == "mixmaxhq/throng"));

        let lib = snap.get("lib@0.1.0").unwrap();
        assert_eq!(
            lib.source,
            Source::Local {
                protocol: Protocol::File,
                path: "./lib".into()
            }
        );
    }

    #[test]
    fn test_format_groups_and_quotes() {
        let snap = parse_as(Format::YarnClassic, LOCK, Some(&manifest())).unwrap();
        let text = format_as(Format::YarnClassic, &snap, &FormatOptions::default(), &NoObserver).unwrap();

        assert!(text.starts_with(HEADER));
        assert!(text.contains("\n\"@babel/code-frame@^7.0.0\", \"@babel/code-frame@^7.12.13\":\n  version \"7.12.13\"\n"));
        assert!(text.contains("\n\"string-width@^4.2.0\", \"sw@npm:string-width@^4.2.0\":\n"));
        assert!(text.contains("\njs-tokens@^4.0.0:\n"));
        assert!(text.contains("  resolved \"https://codeload.github.com/mixmaxhq/throng/tar.gz/8a015a378c2c0db0c760b2147b2468a1c1e86edf\"\n"));
        assert!(text.contains("  resolved \"file:./lib\"\n"));
        assert!(text.contains("  optionalDependencies:\n    fsevents \"~2.3.2\"\n"));
    }

    #[test]
    fn test_round_trip_is_stable() {
        let snap = parse_as(Format::YarnClassic, LOCK, Some(&manifest())).unwrap();
        let opts = FormatOptions::default();
        let first = format_as(Format::YarnClassic, &snap, &opts, &NoObserver).unwrap();
        let reparsed = parse_as(Format::YarnClassic, &first, Some(&manifest())).unwrap();
        assert_eq!(reparsed.entries, snap.entries);
        let second = format_as(Format::YarnClassic, &reparsed, &opts, &NoObserver).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_reports_line() {
        let err = parse_as(Format::YarnClassic, "a@^1.0.0\n  version \"1.0.0\"\n", Some(&manifest())).unwrap_err();
        assert_eq!(err.code(), "LOCK_INVALID_LOCKFILE");
        assert!(err.to_string().contains("line 1"), "{err}");

        let err = parse_as(Format::YarnClassic, "  version \"1.0.0\"\n", Some(&manifest())).unwrap_err();
        assert!(err.to_string().contains("outside of an entry"), "{err}");
    }

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("version \"1.0.0\""), Some(("version".into(), "1.0.0".into())));
        assert_eq!(
            split_pair("\"@babel/highlight\" \"^7.12.13\""),
            Some(("@babel/highlight".into(), "^7.12.13".into()))
        );
        assert_eq!(split_pair("chalk \">= 2.1.2 < 3\""), Some(("chalk".into(), ">= 2.1.2 < 3".into())));
        assert_eq!(split_pair("version"), None);
    }
}
