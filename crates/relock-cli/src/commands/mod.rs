pub mod convert;
pub mod format;
pub mod graph;
pub mod parse;
pub mod version;

use miette::{miette, Result};
use relock_core::pkg::{
    ensure_within, parse, parse_as, Format, GraphObserver, Placement, Resolution, Snapshot,
};
use relock_core::{Config, Error};
use relock_util::fs::{atomic_write, expand_inputs, read_to_string_lossy};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a command reads its lockfile from.
#[derive(Debug, Clone)]
pub struct Input {
    /// Lockfile path or glob, relative to the working directory.
    pub pattern: String,
    /// Explicit package.json path or glob.
    pub manifest: Option<String>,
    /// Dialect override; detected from the text when absent.
    pub from: Option<Format>,
}

impl Input {
    pub fn new(pattern: String, manifest: Option<String>, from: Option<Format>) -> Self {
        Self {
            pattern,
            manifest,
            from,
        }
    }

    /// Read the lockfile and its manifest, then parse into a snapshot.
    ///
    /// Without an explicit manifest, a `package.json` next to the lockfile
    /// is used when present.
    pub fn load(&self, config: &Config, observer: &dyn GraphObserver) -> relock_core::Result<Loaded> {
        let path = first_match(&config.cwd, &self.pattern)?;
        let text = read_file(&path)?;

        let manifest_path = match &self.manifest {
            Some(pattern) => Some(first_match(&config.cwd, pattern)?),
            None => path
                .parent()
                .map(|dir| dir.join("package.json"))
                .filter(|p| p.is_file()),
        };
        let manifest = manifest_path.as_deref().map(read_file).transpose()?;
        debug!(
            lockfile = %path.display(),
            manifest = ?manifest_path.as_ref().map(|p| p.display().to_string()),
            "reading lockfile"
        );

        let snapshot = match self.from {
            Some(format) => parse_as(format, &text, manifest.as_deref(), observer)?,
            None => parse(&text, manifest.as_deref(), observer)?,
        };
        ensure_within(&snapshot, config.max_entries)?;

        let format = self.from.or_else(|| Format::detect(&text));
        Ok(Loaded {
            path,
            format,
            snapshot,
        })
    }
}

/// A parsed lockfile.
pub struct Loaded {
    pub path: PathBuf,
    pub format: Option<Format>,
    pub snapshot: Snapshot,
}

fn first_match(cwd: &Path, pattern: &str) -> relock_core::Result<PathBuf> {
    expand_inputs(cwd, &[pattern.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| Error::other(format!("no input matches {pattern}")))
}

pub(crate) fn read_file(path: &Path) -> relock_core::Result<String> {
    read_to_string_lossy(path).map_err(|e| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("failed to read {}: {e}", path.display()),
        ))
    })
}

/// Write `text` to `output` (relative to the working directory), or stdout.
/// Returns the path written.
pub(crate) fn write_output(
    config: &Config,
    output: Option<&Path>,
    text: &str,
) -> relock_core::Result<Option<PathBuf>> {
    let Some(output) = output else {
        return Ok(None);
    };
    let path = config.cwd.join(output);
    atomic_write(&path, text.as_bytes()).map_err(|e| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("failed to write {}: {e}", path.display()),
        ))
    })?;
    Ok(Some(path))
}

/// Report a failed command. With `--json` prints the error object and exits 1.
pub(crate) fn fail(err: &Error, json: bool) -> Result<()> {
    if json {
        let result = serde_json::json!({
            "ok": false,
            "error": {
                "code": err.code(),
                "message": err.to_string(),
            }
        });
        println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
        std::process::exit(1);
    }
    Err(miette!("[{}] {err}", err.code()))
}

pub(crate) fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Observer that logs structure sizes and, with a debug directory, dumps
/// each structure as JSON.
pub struct TracingObserver {
    debug_dir: Option<PathBuf>,
}

impl TracingObserver {
    pub fn new(config: &Config) -> Self {
        Self {
            debug_dir: config.debug_dir.as_ref().map(|d| config.cwd.join(d)),
        }
    }

    fn dump<T: Serialize>(&self, name: &str, value: &T) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let path = dir.join(format!("{name}.json"));
        let written = std::fs::create_dir_all(dir).and_then(|()| {
            let bytes = serde_json::to_vec_pretty(value)?;
            atomic_write(&path, &bytes)
        });
        match written {
            Ok(()) => debug!(path = %path.display(), "wrote debug dump"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write debug dump"),
        }
    }
}

impl GraphObserver for TracingObserver {
    fn on_snapshot(&self, label: &str, snapshot: &Snapshot) {
        debug!(
            format = label,
            records = snapshot.len(),
            orphans = snapshot.orphans().len(),
            "snapshot built"
        );
        self.dump(&format!("snapshot-{label}"), snapshot);
    }

    fn on_resolution(&self, resolution: &Resolution) {
        debug!(
            roots = resolution.roots.len(),
            tree = resolution.tree.len(),
            edges = resolution.edges.len(),
            production = resolution.production.len(),
            "graph resolved"
        );
        self.dump("tree", resolution);
    }

    fn on_placement(&self, placement: &Placement) {
        debug!(placements = placement.len(), "layout projected");
        self.dump("placement", placement);
    }
}
