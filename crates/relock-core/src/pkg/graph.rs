//! Dependency graph resolution.
//!
//! Walks a [`Snapshot`] from its roots and produces:
//! - `tree`: one [`TreeEntry`] per distinct path of names from a root
//! - `edges`: the deduplicated (consumer, dependency) relation
//! - `production`: records reachable through a root's `dependencies`
//!   (or, from a workspace member, through a name the project root
//!   lists in its own `dependencies`)
//! - `reverse_adjacency`: consumer → its dependency records, first-seen order
//! - `unsatisfied`: declarations whose recorded target is outside the range
//!
//! Each root is walked breadth-first with an explicit queue, so every path
//! of depth `n` is registered before any path of depth `n + 1` of the same
//! root. The projector relies on this ordering.
//!
//! Cycles are not errors: a dependency that already appears on the current
//! path gets its edge and a tree entry, but is not descended into.

use super::error::LockError;
use super::observe::GraphObserver;
use super::reference::{parse_reference, ranges_equivalent, Protocol};
use super::snapshot::{PackageRecord, Snapshot, ROOT_KEY};
use super::version::{is_range, satisfies};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Separator of path chunks in a tree path key. Package names never
/// contain a comma.
const PATH_SEP: char = ',';

/// One (path, record) reachability witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    /// Names from the root to this record; the first chunk is the root's name.
    pub path: Vec<String>,
    /// Record key.
    pub key: String,
    /// Record keys from the root to (excluding) this entry.
    pub parents: Vec<String>,
}

impl TreeEntry {
    /// Stable path key: chunks joined by `,`.
    #[must_use]
    pub fn path_key(&self) -> String {
        join_path(&self.path)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Name under which this entry was declared by its consumer.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }

    /// Path key of the consumer, `None` for roots.
    #[must_use]
    pub fn parent_path_key(&self) -> Option<String> {
        (self.path.len() > 1).then(|| join_path(&self.path[..self.path.len() - 1]))
    }

    /// Top-level dependency through which this entry is reached.
    #[must_use]
    pub fn top_level(&self) -> &str {
        self.path.get(1).map_or("", String::as_str)
    }
}

/// A (consumer, dependency) pair of record keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// A declaration whose recorded target lies outside the declared range.
///
/// The lockfile still names that record for the range, so the edge stands;
/// this only flags a hand-edited or stale lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unsatisfied {
    pub from: String,
    pub name: String,
    pub range: String,
    pub to: String,
}

/// Output of [`resolve`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// Walk roots, in walk order.
    pub roots: Vec<String>,
    /// Arena of tree entries in registration order.
    pub tree: Vec<TreeEntry>,
    pub edges: Vec<Edge>,
    pub production: BTreeSet<String>,
    /// Consumer key → dependency keys, first-seen order, no duplicates.
    pub reverse_adjacency: BTreeMap<String, Vec<String>>,
    pub unsatisfied: Vec<Unsatisfied>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Resolution {
    /// Look up a tree entry by path key.
    #[must_use]
    pub fn entry(&self, path_key: &str) -> Option<&TreeEntry> {
        self.index.get(path_key).map(|&i| &self.tree[i])
    }

    #[must_use]
    pub fn is_production(&self, key: &str) -> bool {
        self.production.contains(key)
    }

    /// Dependencies of a record, in first-seen order.
    #[must_use]
    pub fn dependencies_of(&self, key: &str) -> &[String] {
        self.reverse_adjacency.get(key).map_or(&[], Vec::as_slice)
    }

    /// Distinct record keys present in the tree.
    #[must_use]
    pub fn reachable(&self) -> BTreeSet<&str> {
        self.tree.iter().map(|e| e.key.as_str()).collect()
    }

    /// Tree path keys, in registration order.
    #[must_use]
    pub fn path_keys(&self) -> Vec<String> {
        self.tree.iter().map(TreeEntry::path_key).collect()
    }
}

/// Resolve the graph from every root of the snapshot (project root first,
/// then workspace members ordered by path).
///
/// # Errors
/// Returns `InconsistentSnapshot` for the first declared dependency with no
/// matching record.
pub fn resolve_all(
    snapshot: &Snapshot,
    observer: &dyn GraphObserver,
) -> Result<Resolution, LockError> {
    let roots = snapshot.roots();
    resolve(snapshot, &roots, observer)
}

/// Resolve the graph from the given root keys.
///
/// # Errors
/// Returns `InconsistentSnapshot` for the first declared dependency with no
/// matching record, or for a root key absent from the snapshot.
pub fn resolve(
    snapshot: &Snapshot,
    roots: &[&str],
    observer: &dyn GraphObserver,
) -> Result<Resolution, LockError> {
    let mut walk = Walk {
        snapshot,
        index: RecordIndex::new(snapshot),
        out: Resolution::default(),
        edge_set: HashSet::new(),
    };

    for root in roots {
        walk.walk_root(root)?;
    }

    observer.on_resolution(&walk.out);
    Ok(walk.out)
}

/// Mutable state of one `resolve` call.
struct Walk<'a> {
    snapshot: &'a Snapshot,
    index: RecordIndex<'a>,
    out: Resolution,
    edge_set: HashSet<(String, String)>,
}

impl<'a> Walk<'a> {
    fn walk_root(&mut self, root_key: &str) -> Result<(), LockError> {
        let Some(root) = self.snapshot.get(root_key) else {
            return Err(LockError::inconsistent(root_key, ""));
        };

        self.out.roots.push(root_key.to_string());
        self.out.production.insert(root_key.to_string());

        // Production dependencies of the project root count for every walk.
        let project_deps = self.snapshot.root().map(|r| &r.dependencies);
        let prod_names: HashSet<&str> = root
            .dependencies
            .keys()
            .chain(project_deps.into_iter().flat_map(|deps| deps.keys()))
            .map(String::as_str)
            .collect();
        let Some(root_idx) = self.register(vec![root.name.clone()], root_key, Vec::new(), &prod_names)
        else {
            return Ok(());
        };

        let mut queue = VecDeque::from([root_idx]);
        while let Some(idx) = queue.pop_front() {
            let TreeEntry { path, key, parents } = self.out.tree[idx].clone();
            let record = self.record(&key)?;
            let as_root = idx == root_idx;

            for dep in record.walk_dependencies(as_root) {
                let Some(target) = self.index.find(dep.name, dep.range) else {
                    if dep.optional {
                        continue;
                    }
                    return Err(LockError::inconsistent(dep.name, dep.range));
                };

                if self.add_edge(&key, target) {
                    self.check_range(&key, dep.name, dep.range, target)?;
                }

                let cyclic = target == key || parents.iter().any(|p| p == target);

                let mut child_path = path.clone();
                child_path.push(dep.name.to_string());
                let mut child_parents = parents.clone();
                child_parents.push(key.clone());

                if let Some(child) = self.register(child_path, target, child_parents, &prod_names) {
                    if !cyclic {
                        queue.push_back(child);
                    }
                }
            }
        }

        Ok(())
    }

    fn record(&self, key: &str) -> Result<&'a PackageRecord, LockError> {
        self.snapshot
            .get(key)
            .ok_or_else(|| LockError::inconsistent(key, ""))
    }

    /// Register a tree entry; `None` if the path is already known.
    fn register(
        &mut self,
        path: Vec<String>,
        key: &str,
        parents: Vec<String>,
        prod_names: &HashSet<&str>,
    ) -> Option<usize> {
        let path_key = join_path(&path);
        if self.out.index.contains_key(&path_key) {
            return None;
        }

        if path.get(1).is_some_and(|top| prod_names.contains(top.as_str())) {
            self.out.production.insert(key.to_string());
        }

        let idx = self.out.tree.len();
        self.out.tree.push(TreeEntry {
            path,
            key: key.to_string(),
            parents,
        });
        self.out.index.insert(path_key, idx);
        Some(idx)
    }

    /// Record an edge; `false` if it was already known.
    fn add_edge(&mut self, from: &str, to: &str) -> bool {
        if !self.edge_set.insert((from.to_string(), to.to_string())) {
            return false;
        }
        self.out.edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
        });
        self.out
            .reverse_adjacency
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
        true
    }

    fn check_range(&mut self, from: &str, name: &str, range: &str, to: &str) -> Result<(), LockError> {
        let reference = parse_reference(range);
        if !matches!(reference.protocol, Protocol::Semver | Protocol::Npm) || !is_range(&reference.id) {
            return Ok(());
        }
        let target = self.record(to)?;
        if !satisfies(&target.version, &reference.id) {
            self.out.unsatisfied.push(Unsatisfied {
                from: from.to_string(),
                name: name.to_string(),
                range: range.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

/// Records indexed by name for declaration lookup.
pub(crate) struct RecordIndex<'a> {
    by_name: HashMap<&'a str, Vec<(&'a str, &'a PackageRecord)>>,
}

impl<'a> RecordIndex<'a> {
    pub(crate) fn new(snapshot: &'a Snapshot) -> Self {
        let mut by_name: HashMap<&str, Vec<(&str, &PackageRecord)>> = HashMap::new();
        for (key, record) in &snapshot.entries {
            if key == ROOT_KEY {
                continue;
            }
            by_name
                .entry(record.name.as_str())
                .or_default()
                .push((key.as_str(), record));
        }
        Self { by_name }
    }

    /// Find the record a `(name, range)` declaration points at.
    ///
    /// Tried in order: a record listing the exact range; a record listing
    /// an equivalent range (`npm:^1` vs `^1`); for local protocols the local
    /// record of that name. A range no record lists is not resolved by
    /// version matching: the snapshot is inconsistent.
    pub(crate) fn find(&self, name: &str, range: &str) -> Option<&'a str> {
        let candidates = self.by_name.get(name)?;

        if let Some((key, _)) = candidates.iter().find(|(_, r)| r.ranges.contains(range)) {
            return Some(*key);
        }

        if let Some((key, _)) = candidates
            .iter()
            .find(|(_, r)| r.ranges.iter().any(|known| ranges_equivalent(known, range)))
        {
            return Some(*key);
        }

        let reference = parse_reference(range);
        if !reference.protocol.is_local() {
            return None;
        }
        candidates
            .iter()
            .find(|(_, r)| r.is_local())
            .map(|(key, _)| *key)
    }
}

pub(crate) fn join_path(chunks: &[String]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.push(PATH_SEP);
        }
        out.push_str(chunk);
    }
    out
}
