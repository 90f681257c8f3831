//! Hoisting projector.
//!
//! Maps a [`Resolution`] onto a `node_modules` layout ([`project`]) and
//! reads a layout back into records and ranges ([`invert`]).
//!
//! ## Physical paths
//!
//! A physical path is a `/`-joined chain of `node_modules/<name>` segments,
//! optionally under a local directory:
//!
//! ```text
//! node_modules/a
//! node_modules/a/node_modules/b
//! packages/lib/node_modules/c
//! ```
//!
//! The project root is the empty path. A bare name required from directory
//! `D` resolves to the first existing `<d>/node_modules/<name>` for `d` in
//! [`lookup_dirs`]`(D)`, deepest first.

use super::error::LockError;
use super::graph::{Resolution, TreeEntry};
use super::observe::GraphObserver;
use super::snapshot::{PackageRecord, Snapshot, ROOT_KEY};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const NODE_MODULES: &str = "node_modules";

/// `node_modules/<name>` under `dir`.
#[must_use]
pub fn nm_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        format!("{NODE_MODULES}/{name}")
    } else {
        format!("{dir}/{NODE_MODULES}/{name}")
    }
}

/// Directories searched from `path`, deepest first, ending with the root.
///
/// ```text
/// node_modules/a/node_modules/b -> [node_modules/a/node_modules/b, node_modules/a, ""]
/// packages/lib                  -> [packages/lib, ""]
/// ```
#[must_use]
pub fn lookup_dirs(path: &str) -> Vec<String> {
    let mut out = vec![path.to_string()];
    let mut cur = path;
    let sep = format!("/{NODE_MODULES}/");
    while !cur.is_empty() {
        cur = match cur.rfind(&sep) {
            Some(i) => &cur[..i],
            None => "",
        };
        out.push(cur.to_string());
    }
    out
}

/// Package name installed at a physical path, `None` for the root and for
/// local directories.
#[must_use]
pub fn installed_name(path: &str) -> Option<&str> {
    let marker = format!("{NODE_MODULES}/");
    let at = path.rfind(&marker)?;
    if at > 0 && !path[..at].ends_with('/') {
        return None;
    }
    Some(&path[at + marker.len()..])
}

/// True for paths outside any `node_modules` folder: the root and local
/// directories. Records there walk their dev dependencies.
#[must_use]
pub fn is_root_dir(path: &str) -> bool {
    !path.starts_with("node_modules/") && !path.contains("/node_modules/")
}

/// How a physical entry came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementKind {
    /// Installed copy of a record.
    Package,
    /// Symlink to a local directory.
    Link,
    /// The local directory itself.
    Workspace,
}

/// One occupied physical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placed {
    pub key: String,
    /// Key of the record whose `node_modules` holds this entry; the root key
    /// for top-level entries.
    pub ancestor: String,
    pub kind: PlacementKind,
    /// Not reachable from any root's production dependencies.
    pub dev: bool,
}

/// Output of [`project`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Physical path to entry.
    pub entries: BTreeMap<String, Placed>,
    /// Tree path key to the physical path that serves it.
    pub locations: BTreeMap<String, String>,
}

impl Placement {
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Placed> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn location(&self, path_key: &str) -> Option<&str> {
        self.locations.get(path_key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `name` from directory `from` by nearest-ancestor lookup.
    /// Returns the physical path and its entry.
    #[must_use]
    pub fn lookup(&self, from: &str, name: &str) -> Option<(String, &Placed)> {
        lookup_dirs(from).into_iter().find_map(|dir| {
            let path = nm_path(&dir, name);
            self.entries.get(&path).map(|placed| (path, placed))
        })
    }

    /// Physical entries with their records, ready for a dialect writer or
    /// for [`invert`]. The root is included under the empty path.
    ///
    /// # Errors
    /// Returns `InconsistentSnapshot` if an entry names a key the snapshot
    /// does not hold.
    pub fn to_physical(
        &self,
        snapshot: &Snapshot,
    ) -> Result<BTreeMap<String, PhysicalNode>, LockError> {
        let mut out = BTreeMap::new();
        if let Some(root) = snapshot.root() {
            out.insert(String::new(), PhysicalNode::Package(root.clone()));
        }

        for (path, placed) in &self.entries {
            let record = snapshot
                .get(&placed.key)
                .ok_or_else(|| LockError::inconsistent(&placed.key, ""))?;
            let node = match placed.kind {
                PlacementKind::Link => PhysicalNode::Link {
                    target: local_dir(record).unwrap_or_default(),
                },
                PlacementKind::Package | PlacementKind::Workspace => {
                    PhysicalNode::Package(record.clone())
                }
            };
            out.insert(path.clone(), node);
        }

        Ok(out)
    }
}

/// Project a resolution onto a hoisted layout.
///
/// Tree entries are placed in resolution order. Each goes to the shallowest
/// directory on its consumer's lookup chain that is below any different
/// version already visible there and does not hide a different version from
/// a dependency that was already placed. Local records are pre-placed at their
/// own directory with a top-level link.
///
/// # Errors
/// `PlacementConflict` when no candidate keeps every placed consumer
/// correct, `InconsistentSnapshot` when the tree names an unknown key.
pub fn project(
    snapshot: &Snapshot,
    resolution: &Resolution,
    observer: &dyn GraphObserver,
) -> Result<Placement, LockError> {
    let mut projector = Projector {
        snapshot,
        resolution,
        placement: Placement::default(),
        dir_of: HashMap::new(),
        needers: HashMap::new(),
        required: HashSet::new(),
    };

    projector.place_local_records();
    for entry in &resolution.tree {
        projector.place_entry(entry)?;
    }

    observer.on_placement(&projector.placement);
    Ok(projector.placement)
}

struct Projector<'a> {
    snapshot: &'a Snapshot,
    resolution: &'a Resolution,
    placement: Placement,
    /// Tree path key to physical directory.
    dir_of: HashMap<String, String>,
    /// Dependency name to (consumer directory, required key), for
    /// dependencies already placed. Pending ones are never protected: their
    /// own placement will look at whatever is visible by then.
    needers: HashMap<String, Vec<(String, String)>>,
    required: HashSet<(String, String)>,
}

impl Projector<'_> {
    fn place_local_records(&mut self) {
        let reachable = self.resolution.reachable();
        for (key, record) in &self.snapshot.entries {
            if key == ROOT_KEY || !reachable.contains(key.as_str()) {
                continue;
            }
            let Some(dir) = local_dir(record) else {
                continue;
            };
            let dev = !self.resolution.is_production(key);

            self.placement.entries.insert(
                dir,
                Placed {
                    key: key.clone(),
                    ancestor: ROOT_KEY.to_string(),
                    kind: PlacementKind::Workspace,
                    dev,
                },
            );
            self.placement
                .entries
                .entry(nm_path("", &record.name))
                .or_insert_with(|| Placed {
                    key: key.clone(),
                    ancestor: ROOT_KEY.to_string(),
                    kind: PlacementKind::Link,
                    dev,
                });
        }
    }

    fn place_entry(&mut self, entry: &TreeEntry) -> Result<(), LockError> {
        let snapshot = self.snapshot;
        let record = snapshot
            .get(&entry.key)
            .ok_or_else(|| LockError::inconsistent(entry.name(), ""))?;

        let consumer_dir = match entry.parent_path_key() {
            Some(parent) => Some(
                self.dir_of
                    .get(&parent)
                    .cloned()
                    .ok_or_else(|| LockError::malformed(&entry.path_key()))?,
            ),
            None => None,
        };

        let dir = match (local_dir(record), &consumer_dir) {
            (Some(dir), _) => dir,
            (None, Some(consumer_dir)) => self.place(consumer_dir, entry)?,
            (None, None) => String::new(),
        };

        let path_key = entry.path_key();
        self.placement.locations.insert(path_key.clone(), dir.clone());
        self.dir_of.insert(path_key, dir);
        if let Some(consumer_dir) = consumer_dir {
            self.require(consumer_dir, entry);
        }
        Ok(())
    }

    /// Find or create the physical path serving `entry` for a consumer in
    /// `consumer_dir`.
    fn place(&mut self, consumer_dir: &str, entry: &TreeEntry) -> Result<String, LockError> {
        let name = entry.name();
        let mut dirs = lookup_dirs(consumer_dir);
        dirs.reverse();

        let hit = dirs
            .iter()
            .rposition(|d| self.placement.entries.contains_key(&nm_path(d, name)));
        let start = match hit {
            Some(i) => {
                let path = nm_path(&dirs[i], name);
                if self.placement.entries.get(&path).is_some_and(|p| p.key == entry.key) {
                    return Ok(path);
                }
                i + 1
            }
            None => 0,
        };

        for dir in &dirs[start..] {
            if self.shadows(dir, name, &entry.key) {
                continue;
            }
            let ancestor = if dir.is_empty() {
                ROOT_KEY.to_string()
            } else {
                self.placement
                    .entries
                    .get(dir)
                    .map_or_else(String::new, |p| p.key.clone())
            };
            let path = nm_path(dir, name);
            self.placement.entries.insert(
                path.clone(),
                Placed {
                    key: entry.key.clone(),
                    ancestor,
                    kind: PlacementKind::Package,
                    dev: !self.resolution.is_production(&entry.key),
                },
            );
            return Ok(path);
        }

        Err(LockError::PlacementConflict {
            path: consumer_dir.to_string(),
            name: name.to_string(),
        })
    }

    /// Would `<dir>/node_modules/<name>` holding `key` hide an already
    /// placed dependency from its consumer?
    fn shadows(&self, dir: &str, name: &str, key: &str) -> bool {
        let Some(consumers) = self.needers.get(name) else {
            return false;
        };

        consumers.iter().any(|(consumer, wanted)| {
            if wanted == key {
                return false;
            }
            let chain = lookup_dirs(consumer);
            let Some(dir_pos) = chain.iter().position(|d| d == dir) else {
                return false;
            };
            if consumer == dir {
                return true;
            }
            chain
                .iter()
                .position(|d| self.placement.entries.contains_key(&nm_path(d, name)))
                .is_some_and(|hit_pos| hit_pos > dir_pos)
        })
    }

    /// From now on, `entry`'s record must stay visible from `consumer_dir`.
    fn require(&mut self, consumer_dir: String, entry: &TreeEntry) {
        let name = entry.name();
        if !self.required.insert((consumer_dir.clone(), name.to_string())) {
            return;
        }
        self.needers
            .entry(name.to_string())
            .or_default()
            .push((consumer_dir, entry.key.clone()));
    }
}

fn local_dir(record: &PackageRecord) -> Option<String> {
    if !record.is_local() {
        return None;
    }
    let path = record.source.local_path()?;
    let path = path.strip_prefix("./").unwrap_or(path);
    (path != "." && !path.is_empty()).then(|| path.to_string())
}

/// One physical entry of an ingested layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhysicalNode {
    Package(PackageRecord),
    /// Symlink to another physical path.
    Link { target: String },
}

/// Output of [`invert`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inverted {
    /// Distinct records with ranges rebuilt from the layout.
    pub entries: BTreeMap<String, PackageRecord>,
    /// Physical path to record key, links followed.
    pub keys: BTreeMap<String, String>,
}

/// Rebuild records and ranges from a physical layout.
///
/// Every dependency declared by the record at path `P` is resolved by
/// nearest-ancestor lookup from `P`; the range is added to the record found.
/// Existing ranges on the input records are discarded.
///
/// # Errors
/// `MalformedPlacement` for a link to a missing path, or for a required
/// dependency that no ancestor provides.
pub fn invert(nodes: &BTreeMap<String, PhysicalNode>) -> Result<Inverted, LockError> {
    let mut out = Inverted::default();

    for (path, node) in nodes {
        let key = key_at(nodes, path).ok_or_else(|| LockError::malformed(path))?;
        if let PhysicalNode::Package(record) = node {
            out.entries.entry(key.clone()).or_insert_with(|| {
                let mut record = record.clone();
                record.ranges.clear();
                record
            });
        }
        out.keys.insert(path.clone(), key);
    }

    for (path, node) in nodes {
        let PhysicalNode::Package(record) = node else {
            continue;
        };
        for dep in record.walk_dependencies(is_root_dir(path)) {
            let found = lookup_dirs(path)
                .iter()
                .find_map(|dir| out.keys.get(&nm_path(dir, dep.name)).cloned());

            match found {
                Some(key) => {
                    if let Some(target) = out.entries.get_mut(&key) {
                        target.add_range(dep.range);
                    }
                }
                None if dep.optional => {}
                None => return Err(LockError::malformed(&nm_path(path, dep.name))),
            }
        }
    }

    Ok(out)
}

fn key_at(nodes: &BTreeMap<String, PhysicalNode>, path: &str) -> Option<String> {
    let (path, record) = match nodes.get(path)? {
        PhysicalNode::Package(record) => (path, record),
        PhysicalNode::Link { target } => match nodes.get(target.as_str())? {
            PhysicalNode::Package(record) => (target.as_str(), record),
            PhysicalNode::Link { .. } => return None,
        },
    };
    Some(if path.is_empty() {
        ROOT_KEY.to_string()
    } else {
        record.key()
    })
}
