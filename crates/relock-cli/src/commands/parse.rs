use super::{fail, print_json, write_output, Input, TracingObserver};
use miette::Result;
use relock_core::pkg::Format;
use relock_core::Config;
use std::path::Path;
use tracing::info;

/// `relock parse`: lockfile to snapshot JSON.
pub fn run(config: &Config, input: &Input, output: Option<&Path>, json: bool) -> Result<()> {
    let observer = TracingObserver::new(config);

    let loaded = match input.load(config, &observer) {
        Ok(loaded) => loaded,
        Err(e) => return fail(&e, json),
    };
    let text = match serde_json::to_string_pretty(&loaded.snapshot) {
        Ok(text) => text + "\n",
        Err(e) => return fail(&relock_core::Error::other(e.to_string()), json),
    };
    let written = match write_output(config, output, &text) {
        Ok(written) => written,
        Err(e) => return fail(&e, json),
    };

    info!(
        lockfile = %loaded.path.display(),
        records = loaded.snapshot.len(),
        "parsed lockfile"
    );

    if json {
        let mut result = serde_json::json!({
            "ok": true,
            "format": loaded.format.map(Format::as_str),
            "records": loaded.snapshot.len(),
        });
        match &written {
            Some(path) => result["output"] = path.display().to_string().into(),
            None => {
                result["snapshot"] = serde_json::to_value(&loaded.snapshot).unwrap_or_default();
            }
        }
        print_json(&result);
    } else if written.is_none() {
        print!("{text}");
    }

    Ok(())
}
