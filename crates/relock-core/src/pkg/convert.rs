//! Conversion entry points.
//!
//! ```text
//! lockfile text ──parse──▶ Snapshot ──format──▶ lockfile text
//!                              │
//!                              └──analyze──▶ Resolution + Placement + digest
//! ```

use super::error::LockError;
use super::formats::{self, Format};
use super::graph::{resolve_all, Resolution};
use super::hoist::{project, Placement};
use super::observe::GraphObserver;
use super::snapshot::{Manifest, Snapshot};
use crate::config::FormatOptions;
use crate::error::Error;
use crate::Result;
use relock_util::hash::blake3_lines;
use serde::Serialize;

/// Read a lockfile of any supported dialect.
///
/// `manifest` is the project's `package.json` text. npm-1 and yarn-classic
/// lockfiles do not carry the root manifest and fail without it.
pub fn parse(lockfile: &str, manifest: Option<&str>, observer: &dyn GraphObserver) -> Result<Snapshot> {
    let format = Format::detect(lockfile).ok_or_else(|| LockError::UnsupportedFormat {
        hint: first_line(lockfile),
    })?;
    parse_as(format, lockfile, manifest, observer)
}

/// Read a lockfile as the given dialect, skipping detection.
pub fn parse_as(
    format: Format,
    lockfile: &str,
    manifest: Option<&str>,
    observer: &dyn GraphObserver,
) -> Result<Snapshot> {
    let manifest = manifest
        .map(|text| Manifest::from_json(text).map_err(|e| Error::json("package.json", e)))
        .transpose()?;
    let snapshot = formats::parse(format, lockfile, manifest.as_ref())?;
    observer.on_snapshot(format.as_str(), &snapshot);
    Ok(snapshot)
}

/// Write a snapshot as `target`.
pub fn format(
    snapshot: &Snapshot,
    target: Format,
    opts: &FormatOptions,
    observer: &dyn GraphObserver,
) -> Result<String> {
    formats::format(target, snapshot, opts, observer)
}

/// [`parse`] followed by [`format`].
pub fn convert(
    lockfile: &str,
    manifest: Option<&str>,
    target: Format,
    opts: &FormatOptions,
    observer: &dyn GraphObserver,
) -> Result<String> {
    let snapshot = parse(lockfile, manifest, observer)?;
    format(&snapshot, target, opts, observer)
}

/// Resolved graph and hoisted layout of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub resolution: Resolution,
    pub placement: Placement,
    /// BLAKE3 over tree path keys then edges, in walk order.
    pub digest: String,
}

/// Resolve and project a snapshot.
///
/// # Errors
/// Whatever [`resolve_all`] or [`project`] reject.
pub fn analyze(snapshot: &Snapshot, observer: &dyn GraphObserver) -> Result<Analysis> {
    let resolution = resolve_all(snapshot, observer)?;
    let placement = project(snapshot, &resolution, observer)?;

    let lines = resolution
        .path_keys()
        .into_iter()
        .chain(resolution.edges.iter().map(|e| format!("{} -> {}", e.from, e.to)));
    let digest = blake3_lines(lines);

    Ok(Analysis {
        resolution,
        placement,
        digest,
    })
}

/// Reject snapshots with more records than `limit`.
pub fn ensure_within(snapshot: &Snapshot, limit: Option<usize>) -> std::result::Result<(), LockError> {
    match limit {
        Some(limit) if snapshot.len() > limit => Err(LockError::TooLarge {
            entries: snapshot.len(),
            limit,
        }),
        _ => Ok(()),
    }
}

fn first_line(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default().trim();
    line.chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::observe::NoObserver;
    use std::cell::RefCell;

    const NPM3: &str = r#"{
  "name": "app",
  "version": "1.0.0",
  "lockfileVersion": 3,
  "requires": true,
  "packages": {
    "": { "name": "app", "version": "1.0.0", "dependencies": { "a": "^1.0.0" } },
    "node_modules/a": {
      "version": "1.1.0",
      "resolved": "https://registry.npmjs.org/a/-/a-1.1.0.tgz",
      "integrity": "sha512-aaa",
      "dependencies": { "b": "^2.0.0" }
    },
    "node_modules/b": {
      "version": "2.3.0",
      "resolved": "https://registry.npmjs.org/b/-/b-2.3.0.tgz",
      "integrity": "sha512-bbb",
      "dependencies": { "a": "^1.0.0" }
    }
  }
}
"#;

    #[test]
    fn test_parse_detects_and_reports_snapshot() {
        #[derive(Default)]
        struct Labels(RefCell<Vec<String>>);
        impl GraphObserver for Labels {
            fn on_snapshot(&self, label: &str, _snapshot: &Snapshot) {
                self.0.borrow_mut().push(label.to_string());
            }
        }

        let labels = Labels::default();
        let snap = parse(NPM3, None, &labels).unwrap();
        assert_eq!(snap.len(), 3);
        assert_eq!(*labels.0.borrow(), vec!["npm-3".to_string()]);
    }

    #[test]
    fn test_parse_unknown_format() {
        let err = parse("\n  hello world\n", None, &NoObserver).unwrap_err();
        assert_eq!(err.code(), "LOCK_UNSUPPORTED_FORMAT");
        assert!(err.to_string().contains("hello world"));
    }

    #[test]
    fn test_parse_bad_manifest() {
        let err = parse(NPM3, Some("{not json"), &NoObserver).unwrap_err();
        assert_eq!(err.code(), "JSON_PARSE_ERROR");
        assert!(err.to_string().contains("package.json"));
    }

    #[test]
    fn test_convert_through_every_dialect_keeps_ranges() {
        let manifest = r#"{"name": "app", "version": "1.0.0", "dependencies": {"a": "^1.0.0"}}"#;
        let opts = FormatOptions::default();
        let original = parse(NPM3, None, &NoObserver).unwrap();

        for target in Format::ALL {
            let text = format(&original, target, &opts, &NoObserver).unwrap();
            assert_eq!(Format::detect(&text), Some(target), "{target}");
            let back = parse(&text, Some(manifest), &NoObserver).unwrap();
            for (key, record) in &original.entries {
                assert_eq!(back.entries[key].ranges, record.ranges, "{target}: {key}");
            }
        }
    }

    #[test]
    fn test_analyze_cycle_and_digest() {
        let snap = parse(NPM3, None, &NoObserver).unwrap();
        let first = analyze(&snap, &NoObserver).unwrap();
        let second = analyze(&snap, &NoObserver).unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.resolution.edges.len(), 3);
        assert_eq!(first.placement.len(), 2);

        let mut edited = snap.clone();
        edited.get_mut("b@2.3.0").unwrap().dependencies.clear();
        let third = analyze(&edited, &NoObserver).unwrap();
        assert_ne!(third.digest, first.digest);
    }

    #[test]
    fn test_ensure_within() {
        let snap = parse(NPM3, None, &NoObserver).unwrap();
        assert!(ensure_within(&snap, None).is_ok());
        assert!(ensure_within(&snap, Some(3)).is_ok());
        let err = ensure_within(&snap, Some(2)).unwrap_err();
        assert_eq!(err.code(), "LOCK_TOO_LARGE");
    }
}
