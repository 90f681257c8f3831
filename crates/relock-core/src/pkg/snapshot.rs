//! Dialect-neutral entry store.
//!
//! Every lockfile dialect is read into a [`Snapshot`]: one [`PackageRecord`]
//! per concrete `name@version`, plus a synthetic root record under the empty
//! key that carries the project's own manifest.
//!
//! ## Keys
//!
//! `record_key("lodash", "4.17.21")` is `lodash@4.17.21`; the root record is
//! always stored under [`ROOT_KEY`]. Adapters and the resolver address
//! records exclusively through [`record_key`].

use super::integrity::Hashes;
use super::reference::Protocol;
use crate::version::SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Key of the synthetic root record.
pub const ROOT_KEY: &str = "";

/// Version yarn berry assigns to workspace members.
pub const LOCAL_VERSION: &str = "0.0.0-use.local";

/// Dependency name to raw range.
pub type Dependencies = BTreeMap<String, String>;

/// Stable record key. An empty name addresses the root.
#[must_use]
pub fn record_key(name: &str, version: &str) -> String {
    if name.is_empty() {
        ROOT_KEY.to_string()
    } else {
        format!("{name}@{version}")
    }
}

/// Where a record's contents come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Source {
    /// Plain registry package.
    Registry {
        /// Registry base URL; `None` means the dialect's default.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
        /// Tarball fragment hash (yarn classic appends the sha1).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
    },
    /// Registry package installed under another name (`npm:<target>@<range>`).
    Alias {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
    },
    /// Pinned commit of a VCS repository.
    Vcs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        /// `owner/repo`.
        repo: String,
        commit: String,
    },
    /// Arbitrary tarball URL outside any registry.
    Tarball { url: String },
    /// Local directory: workspace member, `file:`, `link:` or `portal:`.
    Local { protocol: Protocol, path: String },
    /// Yarn patch of a registry package with no base record.
    Patch { locator: String },
}

impl Source {
    /// The project root.
    #[must_use]
    pub fn root() -> Self {
        Self::Local {
            protocol: Protocol::Workspace,
            path: ".".to_string(),
        }
    }

    #[must_use]
    pub fn workspace(path: impl Into<String>) -> Self {
        Self::Local {
            protocol: Protocol::Workspace,
            path: path.into(),
        }
    }

    #[must_use]
    pub fn registry() -> Self {
        Self::Registry {
            registry: None,
            hash: None,
        }
    }

    /// Relative path of a local source.
    #[must_use]
    pub fn local_path(&self) -> Option<&str> {
        match self {
            Self::Local { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// A yarn-berry patch applied on top of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInfo {
    /// Patched resolution locator.
    pub resolution: String,
    /// Descriptors (as written in the lockfile key) that select the patch.
    pub descriptors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// One concrete, installable package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    /// Every raw declaration that resolves to this record, sorted.
    #[serde(default)]
    pub ranges: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hashes: Hashes,
    pub source: Source,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies_meta: Option<Value>,
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
    /// Yarn-berry platform conditions, e.g. `os=darwin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchInfo>,
}

/// A dependency as seen by the walkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkDep<'a> {
    pub name: &'a str,
    pub range: &'a str,
    /// Declared only as optional: an unresolvable target is skipped.
    pub optional: bool,
    /// Declared in the root's `dependencies`.
    pub production: bool,
}

impl PackageRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ranges: BTreeSet::new(),
            hashes: Hashes::new(),
            source,
            dependencies: Dependencies::new(),
            dev_dependencies: Dependencies::new(),
            optional_dependencies: Dependencies::new(),
            peer_dependencies: Dependencies::new(),
            dependencies_meta: None,
            peer_dependencies_meta: None,
            bin: None,
            engines: None,
            funding: None,
            license: None,
            conditions: None,
            patch: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        record_key(&self.name, &self.version)
    }

    /// True for records resolved from a local directory.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self.source, Source::Local { .. })
    }

    /// True for workspace members other than the project root.
    #[must_use]
    pub fn is_workspace_member(&self) -> bool {
        matches!(&self.source, Source::Local { protocol: Protocol::Workspace, path } if path != ".")
    }

    /// Add a declaration that resolves to this record.
    pub fn add_range(&mut self, range: &str) {
        if !self.ranges.contains(range) {
            self.ranges.insert(range.to_string());
        }
    }

    /// Dependencies that the graph walkers follow, in walk order.
    ///
    /// Roots walk `dependencies`, then `devDependencies` and
    /// `optionalDependencies`; a name declared in several maps is walked
    /// once with production winning. Other records walk `dependencies`
    /// then `optionalDependencies`. Peer dependencies are never walked.
    #[must_use]
    pub fn walk_dependencies(&self, as_root: bool) -> Vec<WalkDep<'_>> {
        let mut out: Vec<WalkDep<'_>> = self
            .dependencies
            .iter()
            .map(|(name, range)| WalkDep {
                name,
                range,
                optional: false,
                production: as_root,
            })
            .collect();

        let mut rest: BTreeMap<&str, (&str, bool)> = BTreeMap::new();
        for (name, range) in &self.optional_dependencies {
            rest.insert(name, (range, true));
        }
        if as_root {
            for (name, range) in &self.dev_dependencies {
                rest.insert(name, (range, false));
            }
        }

        for (name, (range, optional)) in rest {
            if self.dependencies.contains_key(name) {
                continue;
            }
            out.push(WalkDep {
                name,
                range,
                optional,
                production: false,
            });
        }

        out
    }
}

/// The project's own `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: Dependencies,
    /// Every other field, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Manifest {
    /// Parse a `package.json` document.
    ///
    /// # Errors
    /// Returns `serde_json::Error` if the text is not a JSON object of the
    /// expected shape.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Workspace globs from either `"workspaces": [...]` or
    /// `"workspaces": {"packages": [...]}`.
    #[must_use]
    pub fn workspace_globs(&self) -> Vec<String> {
        let list = match self.extra.get("workspaces") {
            Some(Value::Array(arr)) => arr,
            Some(Value::Object(obj)) => match obj.get("packages") {
                Some(Value::Array(arr)) => arr,
                _ => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        list.iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()
    }

    fn to_root_record(&self) -> PackageRecord {
        let mut root = PackageRecord::new(
            self.name.clone(),
            self.version.clone().unwrap_or_default(),
            Source::root(),
        );
        root.dependencies.clone_from(&self.dependencies);
        root.dev_dependencies.clone_from(&self.dev_dependencies);
        root.optional_dependencies.clone_from(&self.optional_dependencies);
        root.peer_dependencies.clone_from(&self.peer_dependencies);
        root.license = self
            .extra
            .get("license")
            .and_then(Value::as_str)
            .map(String::from);
        root
    }
}

/// The full entry store of one lockfile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub manifest: Manifest,
    pub entries: BTreeMap<String, PackageRecord>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Snapshot {
    /// Create a snapshot whose root record mirrors `manifest`.
    #[must_use]
    pub fn new(manifest: Manifest) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(ROOT_KEY.to_string(), manifest.to_root_record());
        Self {
            schema_version: SCHEMA_VERSION,
            manifest,
            entries,
        }
    }

    #[must_use]
    pub fn root(&self) -> Option<&PackageRecord> {
        self.entries.get(ROOT_KEY)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PackageRecord> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PackageRecord> {
        self.entries.get_mut(key)
    }

    /// Insert a record, merging ranges into an existing record with the
    /// same key. Returns the stored key.
    pub fn upsert(&mut self, record: PackageRecord) -> String {
        let key = record.key();
        match self.entries.get_mut(&key) {
            Some(existing) => {
                for range in &record.ranges {
                    existing.add_range(range);
                }
            }
            None => {
                self.entries.insert(key.clone(), record);
            }
        }
        key
    }

    /// Keys of every walk root: the project root, then workspace members
    /// ordered by path.
    #[must_use]
    pub fn roots(&self) -> Vec<&str> {
        let mut members: Vec<(&str, &str)> = self
            .entries
            .iter()
            .filter(|(_, r)| r.is_workspace_member())
            .filter_map(|(k, r)| r.source.local_path().map(|p| (p, k.as_str())))
            .collect();
        members.sort_unstable();

        let mut roots = Vec::with_capacity(members.len() + 1);
        if self.entries.contains_key(ROOT_KEY) {
            roots.push(ROOT_KEY);
        }
        roots.extend(members.into_iter().map(|(_, k)| k));
        roots
    }

    /// Number of records, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-root records with no declaration pointing at them.
    #[must_use]
    pub fn orphans(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, r)| !k.is_empty() && r.ranges.is_empty())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}
