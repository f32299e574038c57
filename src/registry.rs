//! Per-session node registry (C8, §4.7): the ordered set of live nodes,
//! keyed by nodeid, protected by its own mutex (outer: session lock; inner:
//! registry lock — §5 lock hierarchy).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::RwLock;

use crate::node::{Node, NodeId};

/// Balanced-tree-backed registry: `BTreeMap` gives `O(log n)` insert/remove/
/// lookup, matching the "chosen structure is balanced-tree-like" guidance
/// of §4.7 without pulling in a dedicated crate the teacher doesn't already
/// depend on.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<NodeId, Arc<Node>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly instantiated node. Returns the previous entry, if
    /// any (a daemon reusing a nodeid across reclaim is a protocol error
    /// the caller should log, not a panic here).
    pub fn insert(&self, node: Arc<Node>) -> Option<Arc<Node>> {
        self.nodes.write().insert(node.nodeid, node)
    }

    /// Remove a node from the registry (reclaim only, §4.6 — `inactive`
    /// leaves the node registered).
    pub fn remove(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.write().remove(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(&id).cloned()
    }

    /// Re-validate a node's claimed parent through the registry rather
    /// than trusting a previously captured weak pointer (§9 design notes:
    /// the parent may have been reclaimed independently).
    pub fn resolve_parent(&self, node: &Node) -> Option<Arc<Node>> {
        if let Some(p) = node.parent.lock().upgrade() {
            return Some(p);
        }
        let resolved = self.get(node.parent_nodeid)?;
        *node.parent.lock() = Arc::downgrade(&resolved);
        Some(resolved)
    }

    /// Mount-wide iteration (forced unmount, teardown): a read lock is held
    /// only long enough to snapshot the live set, so individual node
    /// mutation is never blocked behind a long-running iteration.
    pub fn snapshot(&self) -> Vec<Arc<Node>> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A back-reference that does not keep a node alive, mirroring the weak
/// parent handle pattern used within [`Node`] itself.
pub type WeakNode = Weak<Node>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_roundtrip() {
        let reg = NodeRegistry::new();
        let n = Arc::new(Node::new(NodeId(7), NodeId::ROOT, false, 1));
        assert!(reg.insert(n.clone()).is_none());
        assert!(Arc::ptr_eq(&reg.get(NodeId(7)).unwrap(), &n));
        assert!(reg.remove(NodeId(7)).is_some());
        assert!(reg.get(NodeId(7)).is_none());
    }

    #[test]
    fn snapshot_reflects_live_set() {
        let reg = NodeRegistry::new();
        reg.insert(Arc::new(Node::new(NodeId(2), NodeId::ROOT, false, 1)));
        reg.insert(Arc::new(Node::new(NodeId(3), NodeId::ROOT, true, 1)));
        assert_eq!(reg.snapshot().len(), 2);
    }
}
