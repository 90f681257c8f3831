//! npm lockfile v2: the v3 `packages` table plus the v1 `dependencies`
//! tree for older npm clients. Reading prefers `packages`.

use super::npm1::{format_dependencies, parse_dependencies, Npm1Entry};
use super::npm3::{format_packages, header, parse_packages, to_text, to_value};
use crate::config::FormatOptions;
use crate::error::Error;
use crate::pkg::hoist::Placement;
use crate::pkg::snapshot::{Manifest, Snapshot};
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const LABEL: &str = "npm-2";

#[derive(Debug, Deserialize)]
struct Npm2Lockfile {
    #[serde(default)]
    packages: BTreeMap<String, Value>,
    #[serde(default)]
    dependencies: BTreeMap<String, Npm1Entry>,
}

pub(super) fn parse(text: &str, manifest: Option<&Manifest>) -> Result<Snapshot> {
    let lockfile: Npm2Lockfile = serde_json::from_str(text).map_err(|e| Error::json(LABEL, e))?;
    if lockfile.packages.is_empty() {
        parse_dependencies(LABEL, &lockfile.dependencies, manifest)
    } else {
        parse_packages(LABEL, &lockfile.packages, manifest)
    }
}

pub(super) fn format(snapshot: &Snapshot, placement: &Placement, opts: &FormatOptions) -> Result<String> {
    let mut out = header(snapshot, 2);
    out.insert("packages".into(), to_value(&format_packages(snapshot, placement, opts)?)?);
    out.insert(
        "dependencies".into(),
        to_value(&format_dependencies(snapshot, placement, opts)?)?,
    );
    to_text(&Value::Object(out))
}
