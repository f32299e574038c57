//! Vnode operation implementations (C6, §4.6): the 35+ VFS entry points.
//!
//! Every function here follows the common preamble of §4.6: dead-session
//! short-circuit, the `BLANKET_DENIAL` hook, then (where applicable) the
//! Apple-double/xattr-name filters of §4.4, before the op-specific
//! contract. [`preamble`] centralizes the first two steps so individual
//! ops only need to opt into the exceptions §4.6 names (`close`,
//! `inactive`, `reclaim`, `fsync` return success on a dead session;
//! `access` on the root returns success).

pub mod attr;
pub mod dir;
pub mod io;
pub mod lifecycle;
pub mod lookup;
pub mod misc;
pub mod open;
pub mod paging;
pub mod xattr;

use crate::error::{Error, Result};
use crate::node::{Node, NodeId};
use crate::session::Session;

/// Which `nameiop` a `lookup` is being performed for (§4.6). Only the
/// last path component's operation matters for the `CREATE`/`RENAME`
/// `EJUSTRETURN` special case and the `DELETE`/`RENAME` `.`-component
/// special cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameiOp {
    Lookup,
    Create,
    Delete,
    Rename,
}

/// Whether the component being resolved is the final one in the path
/// being walked (only the host VFS knows this; it is passed in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameiContext {
    pub op: NameiOp,
    pub is_last_component: bool,
}

impl NameiContext {
    pub fn plain_lookup() -> Self {
        NameiContext { op: NameiOp::Lookup, is_last_component: true }
    }
}

/// Dead-session short-circuit (§4.6 preamble step 1) plus the
/// `BLANKET_DENIAL` hook (step 2). Returns `Ok(())` when the op may
/// proceed.
///
/// `root_ok` should be `true` for ops that the spec lists as fabricating a
/// success/attr reply on a dead session even for the root vnode (only
/// `getattr`/`statfs` currently do, via their own dedicated fabrication
/// path — this helper still returns an error for them so the caller can
/// special-case the root before giving up).
pub(crate) fn preamble(session: &Session, node: &Node, op_name: &str) -> Result<()> {
    if session.is_dead() {
        return Err(Error::Dead { disconnected: true });
    }
    if let Some(errno) = session.authorizer.blanket_denial(node, op_name) {
        return Err(Error::Errno(crate::error::Errno(errno)));
    }
    Ok(())
}

/// The six ops exempted from the dead-session short-circuit (§4.6 preamble
/// step 1 exceptions): `close`, `inactive`, `reclaim`, `fsync` always
/// return success on a dead session rather than erroring.
pub(crate) fn dead_session_exempt_ok() -> Result<()> {
    Ok(())
}

/// Resolve a node by id, translating "unknown to the registry" into the
/// stale-vnode protocol error rather than panicking — a reclaimed/unknown
/// nodeid reaching an op entry point indicates the host VFS glue is out of
/// sync with this layer's bookkeeping.
pub(crate) fn require_node(session: &Session, id: NodeId) -> Result<std::sync::Arc<Node>> {
    session.node(id).ok_or(Error::Protocol("nodeid not registered"))
}
