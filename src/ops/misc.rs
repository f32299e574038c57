//! `access`, `fsync`/`fsyncdir`, `statfs`, `pathconf`, `select` (§4.6, §6).

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::dispatch;
use crate::error::{Errno, Error, Result};
use crate::ll::flags::fsync_flags::FsyncFlags;
use crate::node::Node;
use crate::opcode::Opcode;
use crate::ops::preamble;
use crate::pathname::NAME_MAX;
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{self, FuseAccessIn, FuseFsyncIn, FuseKstatfs};
use crate::{AccessFlags, FileType};

/// `access(node, mask)`.
///
/// Dead session: root vnode answers `0` (succeeds) unconditionally;
/// anything else is `ENXIO` without dispatch. Symlinks are always
/// permitted without dispatch, mirroring `vnode_islnk(vp)` in the
/// original — approximated here via the node's last cached kind, since
/// this layer does not carry a dedicated vnode-type field outside the
/// attribute cache.
pub fn access(session: &Session, node: &Node, mask: AccessFlags) -> Result<()> {
    if session.is_dead() {
        if node.nodeid.is_root() {
            return Ok(());
        }
        return Err(Error::Dead { disconnected: false });
    }
    if let Some(errno) = session.authorizer.blanket_denial(node, "access") {
        return Err(Error::Errno(Errno(errno)));
    }
    if node.cached_attr().map(|a| a.kind) == Some(FileType::Symlink) {
        return Ok(());
    }

    let body = FuseAccessIn { mask: mask.bits() as u32, padding: 0 };
    let req = RequestPayload::new(Opcode::Access, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    dispatch::call(session, req)?;
    Ok(())
}

/// `fsync(node, fh, waitfor, datasync)`. `waitfor` is accepted but ignored
/// (Open Question — kept as in the original, see DESIGN.md); `datasync`
/// sets `FUSE_FSYNC_FDATASYNC`, mirroring the `fdatasync(2)`/`fsync(2)`
/// distinction the wire flag exists for. Dead-session short-circuits to
/// success rather than `ENXIO` (listed preamble exception, §4.6).
pub fn fsync(session: &Session, node: &Node, fh: u64, waitfor: bool, datasync: bool) -> Result<()> {
    let _ = waitfor;
    if session.is_dead() {
        return Ok(());
    }
    preamble(session, node, "fsync")?;
    let fsync_flags = if datasync { FsyncFlags::FUSE_FSYNC_FDATASYNC } else { FsyncFlags::empty() };
    let body = FuseFsyncIn { fh, fsync_flags: fsync_flags.bits(), padding: 0 };
    let req = RequestPayload::new(Opcode::Fsync, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    dispatch::call(session, req)?;
    Ok(())
}

/// `fsyncdir(node, fh, waitfor, datasync)`: same contract as [`fsync`]
/// over `FSYNCDIR`.
pub fn fsyncdir(session: &Session, node: &Node, fh: u64, waitfor: bool, datasync: bool) -> Result<()> {
    let _ = waitfor;
    if session.is_dead() {
        return Ok(());
    }
    preamble(session, node, "fsyncdir")?;
    let fsync_flags = if datasync { FsyncFlags::FUSE_FSYNC_FDATASYNC } else { FsyncFlags::empty() };
    let body = FuseFsyncIn { fh, fsync_flags: fsync_flags.bits(), padding: 0 };
    let req = RequestPayload::new(Opcode::Fsyncdir, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    dispatch::call(session, req)?;
    Ok(())
}

/// Host-visible filesystem-wide statistics, decoded from the wire
/// `fuse_kstatfs` shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statfs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

impl From<FuseKstatfs> for Statfs {
    fn from(k: FuseKstatfs) -> Self {
        Statfs {
            blocks: k.blocks,
            bfree: k.bfree,
            bavail: k.bavail,
            files: k.files,
            ffree: k.ffree,
            bsize: k.bsize,
            namelen: k.namelen,
            frsize: k.frsize,
        }
    }
}

/// `statfs(root)`. Fabricates an empty-but-valid answer on a dead session
/// rather than propagating `ENOTCONN`, mirroring the root-vnode
/// fabrication `getattr` performs (§7).
pub fn statfs(session: &Session, root: &Node) -> Result<Statfs> {
    if session.is_dead() {
        return Ok(Statfs {
            bsize: session.config.blocksize,
            frsize: session.config.blocksize,
            namelen: NAME_MAX as u32,
            ..Default::default()
        });
    }
    preamble(session, root, "statfs")?;
    let req = RequestPayload::new(Opcode::Statfs, Vec::new());
    let reply = dispatch::call(session, req)?;
    let kstatfs: FuseKstatfs = wire::parse(&reply)?;
    Ok(kstatfs.into())
}

/// `pathconf` variable names this layer answers (§6's closed table).
/// Numeric values mirror the platform's `<unistd.h>`/`<limits.h>`
/// numbering; anything outside this set is `EINVAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum PathconfName {
    LinkMax = 1,
    NameMax = 4,
    PathMax = 5,
    PipeBuf = 6,
    ChownRestricted = 7,
    NoTrunc = 8,
    NameCharsMax = 25,
    CaseSensitive = 26,
    CasePreserving = 27,
}

/// `pathconf(name)`: a closed table of answers (§6), no session
/// interaction and no dispatch. Names outside [`PathconfName`] are
/// `EINVAL`.
pub fn pathconf(raw_name: i32) -> Result<i64> {
    let name = PathconfName::try_from_primitive(raw_name).map_err(|_| Error::Errno(Errno::EINVAL))?;
    Ok(match name {
        PathconfName::LinkMax => libc::LINK_MAX as i64,
        PathconfName::NameMax => NAME_MAX as i64,
        PathconfName::PathMax => libc::PATH_MAX as i64,
        PathconfName::PipeBuf => libc::PIPE_BUF as i64,
        PathconfName::ChownRestricted => 1,
        PathconfName::NoTrunc => 0,
        PathconfName::NameCharsMax => NAME_MAX as i64,
        PathconfName::CaseSensitive => 1,
        PathconfName::CasePreserving => 1,
    })
}

/// `select(node)` **(added, from original_source)**: FUSE has no
/// readiness-notification opcode for regular files, so the original
/// always reports ready. No dispatch, no capability check, no preamble.
pub fn select(_session: &Session, _node: &Node) -> Result<bool> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namecache::NullNameCache;
    use crate::node::{Node, NodeId};
    use crate::session::SessionConfig;
    use crate::test_support::{FakeDispatcher, FakePageCache};
    use std::sync::Arc;
    use zerocopy::IntoBytes;

    fn session_with(fd: FakeDispatcher) -> Arc<Session> {
        Session::new(
            SessionConfig::new("/mnt"),
            Arc::new(fd),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        )
    }

    #[test]
    fn access_on_root_succeeds_when_dead() {
        let fd = FakeDispatcher::new();
        fd.disconnect();
        let session = session_with(fd);
        let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
        access(&session, &root, AccessFlags::R_OK).unwrap();
    }

    #[test]
    fn access_on_non_root_is_enxio_when_dead() {
        let fd = FakeDispatcher::new();
        fd.disconnect();
        let session = session_with(fd);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = access(&session, &node, AccessFlags::R_OK).unwrap_err();
        assert!(matches!(err, Error::Dead { disconnected: false }));
    }

    #[test]
    fn access_dispatches_for_ordinary_nodes() {
        let fd = Arc::new(FakeDispatcher::new());
        fd.reply(Opcode::Access, Vec::new());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd.clone(),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        access(&session, &node, AccessFlags::W_OK).unwrap();
        assert_eq!(fd.call_count(Opcode::Access), 1);
    }

    #[test]
    fn fsync_succeeds_on_dead_session() {
        let fd = FakeDispatcher::new();
        fd.disconnect();
        let session = session_with(fd);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        fsync(&session, &node, 1, true, false).unwrap();
    }

    #[test]
    fn fsync_datasync_dispatches_once() {
        let fd = Arc::new(FakeDispatcher::new());
        fd.reply(Opcode::Fsync, Vec::new());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd.clone(),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        fsync(&session, &node, 1, true, true).unwrap();
        assert_eq!(fd.call_count(Opcode::Fsync), 1);
    }

    #[test]
    fn statfs_fabricates_on_dead_session() {
        let fd = FakeDispatcher::new();
        fd.disconnect();
        let session = session_with(fd);
        let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
        let st = statfs(&session, &root).unwrap();
        assert_eq!(st.bsize, session.config.blocksize);
    }

    #[test]
    fn statfs_dispatches_when_live() {
        let kstatfs = FuseKstatfs {
            blocks: 100,
            bfree: 50,
            bavail: 50,
            files: 10,
            ffree: 5,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
            padding: 0,
            spare: [0; 6],
        };
        let fd = Arc::new(FakeDispatcher::new());
        fd.reply(Opcode::Statfs, kstatfs.as_bytes().to_vec());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd,
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
        let st = statfs(&session, &root).unwrap();
        assert_eq!(st.blocks, 100);
    }

    #[test]
    fn pathconf_table_answers() {
        assert_eq!(pathconf(PathconfName::NameMax as i32).unwrap(), 255);
        assert_eq!(pathconf(PathconfName::NoTrunc as i32).unwrap(), 0);
        assert!(pathconf(999).is_err());
    }

    #[test]
    fn select_is_always_ready() {
        let fd = FakeDispatcher::new();
        let session = session_with(fd);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        assert!(select(&session, &node).unwrap());
    }
}
