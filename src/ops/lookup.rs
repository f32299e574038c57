//! `lookup` (§4.6).

use std::sync::Arc;

use crate::attr::{file_attr_from_wire, kind_from_mode};
use crate::dispatch;
use crate::error::{Errno, Error, Result};
use crate::namecache::CacheLookup;
use crate::node::{Node, NodeId};
use crate::opcode::Opcode;
use crate::ops::{preamble, require_node, NameiContext, NameiOp};
use crate::pathname::{check_name_length, reject_apple_double_lookup, reject_embedded_nul};
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{self, FuseEntryOut, FuseForgetIn};
use crate::FileAttr;

/// Outcome of a `lookup` call. `JustReturn` is the BSD `EJUSTRETURN`
/// pseudo-errno (§4.6): the caller (host VFS glue) should proceed with its
/// own create/rename logic rather than treat this as failure.
#[derive(Debug)]
pub enum LookupOutcome {
    /// Resolved to a live (possibly freshly instantiated) node.
    Found { nodeid: NodeId, attr: FileAttr, generation: u64 },
    /// Cached or fresh negative entry.
    NotFound(Errno),
    /// `CREATE`/`RENAME` on the last component with no existing entry.
    JustReturn,
}

fn forget_one(session: &Session, nodeid: NodeId, n: u64) {
    if nodeid.is_root() || n == 0 {
        return;
    }
    let body = FuseForgetIn { nlookup: n };
    let req = RequestPayload::new(Opcode::Forget, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    // FORGET has no reply; errors are not actionable here beyond logging.
    let _ = dispatch::call(session, req);
}

fn getattr_self(session: &Session, target: NodeId) -> Result<(FileAttr, u64)> {
    let body = crate::wire::FuseGetattrIn { getattr_flags: 0, dummy: 0, fh: 0 };
    let req = RequestPayload::new(
        Opcode::Getattr,
        zerocopy::IntoBytes::as_bytes(&body).to_vec(),
    );
    let reply = dispatch::call(session, req)?;
    let out: crate::wire::FuseAttrOut = wire::parse(&reply)?;
    let attr = file_attr_from_wire(target, &out.attr)?;
    Ok((attr, 0))
}

/// `lookup(parent, name, ctx)`.
///
/// `.`/`..` never consult the name cache: `..` resolves through the
/// parent's own nodeid (re-dispatching `GETATTR` on it), `.` resolves
/// through the node's own id.
pub fn lookup(
    session: &Session,
    parent: &Node,
    name: &[u8],
    ctx: NameiContext,
) -> Result<LookupOutcome> {
    preamble(session, parent, "lookup")?;
    check_name_length(name)?;
    reject_embedded_nul(name)?;

    if name == b".." {
        let parent_of_parent = session.registry.resolve_parent(parent)
            .ok_or(Error::Protocol("parent vnode not registered"))?;
        if ctx.op == NameiOp::Delete && ctx.is_last_component {
            let attr = parent_of_parent.cached_attr().unwrap_or(crate::attr::root_fallback_attr(0, 0));
            return Ok(LookupOutcome::Found { nodeid: parent_of_parent.nodeid, attr, generation: 0 });
        }
        let (attr, generation) = getattr_self(session, parent_of_parent.nodeid)?;
        return Ok(LookupOutcome::Found { nodeid: parent_of_parent.nodeid, attr, generation });
    }

    if name == b"." {
        if ctx.op == NameiOp::Delete && ctx.is_last_component {
            return Ok(LookupOutcome::Found {
                nodeid: parent.nodeid,
                attr: parent.cached_attr().unwrap_or(crate::attr::root_fallback_attr(0, 0)),
                generation: 0,
            });
        }
        if ctx.op == NameiOp::Rename && ctx.is_last_component {
            return Err(Error::Errno(Errno::EISDIR));
        }
        let (attr, generation) = getattr_self(session, parent.nodeid)?;
        return Ok(LookupOutcome::Found { nodeid: parent.nodeid, attr, generation });
    }

    reject_apple_double_lookup(name)?;

    if session.name_cache_enabled() {
        match session.namecache.lookup(parent.nodeid, name) {
            CacheLookup::Hit(nodeid) => {
                let node = require_node(session, nodeid)?;
                let attr = node.cached_attr().unwrap_or(crate::attr::root_fallback_attr(0, 0));
                return Ok(LookupOutcome::Found { nodeid, attr, generation: 0 });
            }
            CacheLookup::Negative(errno) => {
                if ctx.is_last_component && matches!(ctx.op, NameiOp::Create | NameiOp::Rename) {
                    return Ok(LookupOutcome::JustReturn);
                }
                return Ok(LookupOutcome::NotFound(Errno(errno)));
            }
            CacheLookup::Miss => {}
        }
    }

    dispatch_lookup(session, parent, name, ctx)
}

fn dispatch_lookup(
    session: &Session,
    parent: &Node,
    name: &[u8],
    ctx: NameiContext,
) -> Result<LookupOutcome> {
    let mut body = name.to_vec();
    body.push(0);
    let req = RequestPayload::new(Opcode::Lookup, body);
    let reply = dispatch::call(session, req)?;
    let out: FuseEntryOut = wire::parse(&reply)?;

    if out.nodeid == 0 {
        session.namecache.enter(parent.nodeid, name, None);
        if ctx.is_last_component && matches!(ctx.op, NameiOp::Create | NameiOp::Rename) {
            return Ok(LookupOutcome::JustReturn);
        }
        return Ok(LookupOutcome::NotFound(Errno::ENOENT));
    }

    if out.nodeid == wire::FUSE_ROOT_ID {
        forget_one(session, NodeId(out.nodeid), 1);
        return Err(Error::Errno(Errno::EINVAL));
    }

    let nodeid = NodeId(out.nodeid);
    let kind_check = kind_from_mode(out.attr.mode);
    let kind = match kind_check {
        Ok(k) => k,
        Err(e) => {
            forget_one(session, nodeid, 1);
            return Err(e);
        }
    };

    if !ctx.is_last_component && kind != crate::FileType::Directory && kind != crate::FileType::Symlink {
        forget_one(session, nodeid, 1);
        return Err(Error::Errno(Errno::ENOTDIR));
    }

    let attr = match file_attr_from_wire(nodeid, &out.attr) {
        Ok(a) => a,
        Err(e) => {
            forget_one(session, nodeid, 1);
            return Err(e);
        }
    };

    // Instantiate or reuse the node; a registry miss means this is a fresh
    // daemon-side reference (nlookup=1), a hit means the existing node
    // gains one more outstanding LOOKUP grant.
    match session.node(nodeid) {
        Some(existing) => existing.bump_nlookup(1),
        None => {
            let node = Arc::new(Node::new(nodeid, parent.nodeid, kind == crate::FileType::Directory, 1));
            node.cache_attr(attr, std::time::Duration::from_nanos(
                out.attr_valid * 1_000_000_000 + u64::from(out.attr_valid_nsec),
            ));
            session.registry.insert(node);
        }
    }

    session.namecache.enter(parent.nodeid, name, Some(nodeid));
    Ok(LookupOutcome::Found { nodeid, attr, generation: out.generation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namecache::NullNameCache;
    use crate::session::SessionConfig;
    use crate::test_support::{FakeDispatcher, FakePageCache};
    use zerocopy::IntoBytes;

    fn test_session() -> (Arc<Session>, Arc<FakeDispatcher>) {
        let fd = Arc::new(FakeDispatcher::new());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd.clone(),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        (session, fd)
    }

    fn sample_entry(nodeid: u64, mode: u32) -> Vec<u8> {
        let out = FuseEntryOut {
            nodeid,
            generation: 1,
            entry_valid: 1,
            attr_valid: 1,
            entry_valid_nsec: 0,
            attr_valid_nsec: 0,
            attr: crate::wire::FuseAttr {
                ino: nodeid,
                size: 0,
                blocks: 0,
                atime: 0,
                mtime: 0,
                ctime: 0,
                crtime: 0,
                atimensec: 0,
                mtimensec: 0,
                ctimensec: 0,
                crtimensec: 0,
                mode,
                nlink: 1,
                uid: 0,
                gid: 0,
                rdev: 0,
                flags: 0,
                blksize: 4096,
                padding: 0,
            },
        };
        out.as_bytes().to_vec()
    }

    #[test]
    fn apple_double_rejected_without_dispatch() {
        let (session, fd) = test_session();
        let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
        session.registry.insert(root.clone());
        let err = lookup(&session, &root, b"._foo", NameiContext::plain_lookup()).unwrap_err();
        assert!(matches!(err, Error::Errno(e) if e == Errno::ENOENT));
        assert!(fd.calls().is_empty());
    }

    #[test]
    fn negative_reply_caches_and_returns_not_found() {
        let (session, fd) = test_session();
        let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
        session.registry.insert(root.clone());
        let out = FuseEntryOut {
            nodeid: 0,
            generation: 0,
            entry_valid: 0,
            attr_valid: 0,
            entry_valid_nsec: 0,
            attr_valid_nsec: 0,
            attr: unsafe { std::mem::zeroed() },
        };
        fd.reply(Opcode::Lookup, out.as_bytes().to_vec());
        let result = lookup(&session, &root, b"missing", NameiContext::plain_lookup()).unwrap();
        assert!(matches!(result, LookupOutcome::NotFound(e) if e == Errno::ENOENT));
    }

    #[test]
    fn create_last_component_miss_is_just_return() {
        let (session, fd) = test_session();
        let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
        session.registry.insert(root.clone());
        let out = FuseEntryOut {
            nodeid: 0,
            generation: 0,
            entry_valid: 0,
            attr_valid: 0,
            entry_valid_nsec: 0,
            attr_valid_nsec: 0,
            attr: unsafe { std::mem::zeroed() },
        };
        fd.reply(Opcode::Lookup, out.as_bytes().to_vec());
        let ctx = NameiContext { op: NameiOp::Create, is_last_component: true };
        let result = lookup(&session, &root, b"newfile", ctx).unwrap();
        assert!(matches!(result, LookupOutcome::JustReturn));
    }

    #[test]
    fn root_nodeid_in_reply_is_einval() {
        let (session, fd) = test_session();
        let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
        session.registry.insert(root.clone());
        fd.reply(Opcode::Lookup, sample_entry(wire::FUSE_ROOT_ID, libc::S_IFREG as u32 | 0o644));
        let err = lookup(&session, &root, b"weird", NameiContext::plain_lookup()).unwrap_err();
        assert!(matches!(err, Error::Errno(e) if e == Errno::EINVAL));
        assert_eq!(fd.call_count(Opcode::Forget), 1);
    }

    #[test]
    fn successful_lookup_instantiates_node_with_nlookup_one() {
        let (session, fd) = test_session();
        let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
        session.registry.insert(root.clone());
        fd.reply(Opcode::Lookup, sample_entry(42, libc::S_IFREG as u32 | 0o644));
        let result = lookup(&session, &root, b"file.txt", NameiContext::plain_lookup()).unwrap();
        match result {
            LookupOutcome::Found { nodeid, .. } => {
                assert_eq!(nodeid, NodeId(42));
                let node = session.node(NodeId(42)).unwrap();
                assert_eq!(node.nlookup(), 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
