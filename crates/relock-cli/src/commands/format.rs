use super::{fail, print_json, read_file, write_output, TracingObserver};
use miette::Result;
use relock_core::pkg::{ensure_within, format, Format, Snapshot};
use relock_core::version::SCHEMA_VERSION;
use relock_core::{Config, Error};
use relock_util::fs::expand_inputs;
use relock_util::hash::blake3_bytes;
use std::path::Path;
use tracing::info;

/// `relock format`: snapshot JSON to lockfile text.
pub fn run(
    config: &Config,
    snapshot: &str,
    target: Format,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let observer = TracingObserver::new(config);

    let text = match load_snapshot(config, snapshot)
        .and_then(|snap| format(&snap, target, &config.format, &observer))
    {
        Ok(text) => text,
        Err(e) => return fail(&e, json),
    };
    let written = match write_output(config, output, &text) {
        Ok(written) => written,
        Err(e) => return fail(&e, json),
    };

    info!(format = %target, bytes = text.len(), "wrote lockfile");
    report(target, &text, written.as_deref(), json);
    Ok(())
}

fn load_snapshot(config: &Config, pattern: &str) -> relock_core::Result<Snapshot> {
    let path = expand_inputs(&config.cwd, &[pattern.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| Error::other(format!("no input matches {pattern}")))?;
    let text = read_file(&path)?;
    let snapshot: Snapshot = serde_json::from_str(&text).map_err(|e| {
        Error::other(format!("invalid snapshot {}: {e}", path.display()))
    })?;

    if snapshot.schema_version > SCHEMA_VERSION {
        return Err(Error::other(format!(
            "snapshot schema {} is newer than supported schema {SCHEMA_VERSION}",
            snapshot.schema_version
        )));
    }
    ensure_within(&snapshot, config.max_entries)?;
    Ok(snapshot)
}

/// Print the emitted lockfile, or a JSON result object.
pub(crate) fn report(target: Format, text: &str, written: Option<&Path>, json: bool) {
    if json {
        let mut result = serde_json::json!({
            "ok": true,
            "format": target.as_str(),
            "blake3": blake3_bytes(text.as_bytes()),
        });
        match written {
            Some(path) => result["output"] = path.display().to_string().into(),
            None => result["lockfile"] = text.into(),
        }
        print_json(&result);
    } else if written.is_none() {
        print!("{text}");
    }
}
