use super::format::report;
use super::{fail, write_output, Input, TracingObserver};
use miette::Result;
use relock_core::pkg::{format, Format};
use relock_core::Config;
use std::path::Path;
use tracing::info;

/// `relock convert`: lockfile to lockfile of another dialect.
pub fn run(
    config: &Config,
    input: &Input,
    target: Format,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let observer = TracingObserver::new(config);

    let converted = input.load(config, &observer).and_then(|loaded| {
        let text = format(&loaded.snapshot, target, &config.format, &observer)?;
        Ok((loaded, text))
    });
    let (loaded, text) = match converted {
        Ok(pair) => pair,
        Err(e) => return fail(&e, json),
    };
    let written = match write_output(config, output, &text) {
        Ok(written) => written,
        Err(e) => return fail(&e, json),
    };

    info!(
        lockfile = %loaded.path.display(),
        from = loaded.format.map_or("unknown", Format::as_str),
        to = %target,
        records = loaded.snapshot.len(),
        "converted lockfile"
    );
    report(target, &text, written.as_deref(), json);
    Ok(())
}
