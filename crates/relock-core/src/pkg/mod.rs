//! Lockfile model and algorithms.
//!
//! Provides:
//! - Parsing dependency declarations and `name@range` descriptors
//! - npm range satisfaction over `semver`
//! - The dialect-neutral snapshot of package records
//! - Resolving a snapshot into a dependency graph
//! - Projecting the graph onto a hoisted `node_modules` layout, and back
//! - Reading and writing npm v1/v2/v3 and yarn classic/berry lockfiles

pub mod convert;
pub mod error;
pub mod formats;
pub mod graph;
pub mod hoist;
pub mod integrity;
pub mod observe;
pub mod reference;
pub mod snapshot;
pub mod spec;
pub mod tarball;
pub mod version;

pub use convert::{analyze, convert, ensure_within, format, parse, parse_as, Analysis};
pub use error::{codes as lock_codes, LockError};
pub use formats::Format;
pub use graph::{resolve, resolve_all, Edge, Resolution, TreeEntry, Unsatisfied};
pub use hoist::{invert, project, Inverted, PhysicalNode, Placed, Placement, PlacementKind};
pub use integrity::{format_integrity, parse_integrity, Hashes};
pub use observe::{GraphObserver, NoObserver};
pub use reference::{
    canonical_range, map_reference, normalize_reference, parse_reference, ranges_equivalent,
    MapStrategy, Protocol, Reference,
};
pub use snapshot::{
    record_key, Dependencies, Manifest, PackageRecord, PatchInfo, Snapshot, Source, LOCAL_VERSION,
    ROOT_KEY,
};
pub use spec::Descriptor;
pub use tarball::{format_tarball_url, parse_tarball_url, TarballUrl};
pub use version::satisfies;
