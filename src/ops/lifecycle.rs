//! `reclaim`/`inactive` (§4.6): handle-table teardown at the two points
//! where the host VFS gives up its last interest in a vnode.

use crate::dispatch;
use crate::error::Result;
use crate::node::{AccessClass, Node};
use crate::opcode::Opcode;
use crate::ops::dead_session_exempt_ok;
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{FuseForgetIn, FuseReleaseIn};

fn send_release(session: &Session, class: AccessClass, fh: u64, is_dir: bool) {
    let _ = class;
    let body = FuseReleaseIn { fh, flags: 0, release_flags: 0, lock_owner: 0 };
    let opcode = if is_dir { Opcode::Releasedir } else { Opcode::Release };
    let req = RequestPayload::new(opcode, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    let _ = dispatch::call(session, req);
}

/// `reclaim(node)`: the vnode is being recycled by the host VFS. Drains
/// every handle unconditionally (even on a dead session — the exemption
/// in the common preamble exists precisely so this still runs), sends a
/// final `FORGET` if any lookups are still outstanding, and detaches the
/// node from the registry.
///
/// The name cache is purged first, unconditionally, mirroring the
/// original's `out:` label which runs the purge even on the dead-session
/// fast path.
pub fn reclaim(session: &Session, node: &Node) -> Result<()> {
    dead_session_exempt_ok()?;
    session.namecache.purge(node.nodeid);

    let is_dir = node.is_dir();
    for (class, fh) in node.drain_handles() {
        send_release(session, class, fh, is_dir);
    }

    let nlookup = node.nlookup();
    if nlookup > 0 {
        let body = FuseForgetIn { nlookup };
        let req = RequestPayload::new(Opcode::Forget, zerocopy::IntoBytes::as_bytes(&body).to_vec());
        let _ = dispatch::call(session, req);
    }

    session.registry.remove(node.nodeid);
    *node.parent.lock() = std::sync::Weak::new();
    Ok(())
}

/// `inactive(node)`: the last open reference on the vnode went away, but
/// the host VFS may still hold (or reacquire) the vnode itself. Drains
/// every handle exactly as [`reclaim`] does, but leaves the node
/// registered — only `reclaim` detaches.
pub fn inactive(session: &Session, node: &Node) -> Result<()> {
    dead_session_exempt_ok()?;
    let is_dir = node.is_dir();
    for (class, fh) in node.drain_handles() {
        send_release(session, class, fh, is_dir);
    }
    Ok(())
}
