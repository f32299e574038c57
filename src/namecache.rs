//! Boundary to the host VFS name cache (out of scope, §1).
//!
//! Consumed, not defined: `lookup(parent, cnp) -> {hit|miss|negative}`,
//! `enter`, `purge`, `purge_negatives` (§6). A caller wires its own name
//! cache (or, in tests, a fake) into [`crate::session::Session`].

use crate::node::NodeId;

/// Outcome of a name-cache probe for one `(parent, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The pair resolved to a live node.
    Hit(NodeId),
    /// Not present in the cache; the caller must dispatch `LOOKUP`.
    Miss,
    /// Cached as known-absent; the daemon errno that produced the negative
    /// entry is remembered so repeated lookups don't re-dispatch.
    Negative(libc::c_int),
}

/// Host VFS name cache (`(parent, name) -> vnode` table with negative
/// entries), per §6's external interface list.
pub trait NameCache: Send + Sync {
    /// Probe the cache for `(parent, name)`.
    fn lookup(&self, parent: NodeId, name: &[u8]) -> CacheLookup;

    /// Record a positive (`Some(node)`) or negative (`None`) entry.
    fn enter(&self, parent: NodeId, name: &[u8], node: Option<NodeId>);

    /// Drop every entry naming `node`, in either direction (as a name's
    /// target, and as a parent of other entries).
    fn purge(&self, node: NodeId);

    /// Drop only the negative entries under `parent` (used after a
    /// successful create/mkdir/mknod/symlink/link so a prior negative
    /// lookup doesn't shadow the new name).
    fn purge_negatives(&self, parent: NodeId);
}

/// A [`NameCache`] that never caches anything; every probe misses. Used
/// when a session is constructed with `NO_VNCACHE` set, so op code does
/// not need a separate "is caching enabled" branch at each call site.
#[derive(Debug, Default)]
pub struct NullNameCache;

impl NameCache for NullNameCache {
    fn lookup(&self, _parent: NodeId, _name: &[u8]) -> CacheLookup {
        CacheLookup::Miss
    }

    fn enter(&self, _parent: NodeId, _name: &[u8], _node: Option<NodeId>) {}

    fn purge(&self, _node: NodeId) {}

    fn purge_negatives(&self, _parent: NodeId) {}
}
