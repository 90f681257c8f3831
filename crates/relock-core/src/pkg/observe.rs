//! Observation hooks for intermediate structures.
//!
//! The resolver and projector report what they built through a
//! [`GraphObserver`] passed in by the caller. The CLI uses this to log
//! counts and dump JSON files into a debug directory.

use super::graph::Resolution;
use super::hoist::Placement;
use super::snapshot::Snapshot;

/// Receives intermediate results. Every method defaults to a no-op.
pub trait GraphObserver {
    /// A snapshot was built by an adapter. `label` names the dialect.
    fn on_snapshot(&self, _label: &str, _snapshot: &Snapshot) {}

    fn on_resolution(&self, _resolution: &Resolution) {}

    fn on_placement(&self, _placement: &Placement) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl GraphObserver for NoObserver {}
