//! `pagein`/`pageout`/`strategy`/`blktooff`/`offtoblk`/`bmap` (§4.6).

use crate::dispatch;
use crate::error::{Error, Result};
use crate::flags::NodeFlags;
use crate::node::Node;
use crate::opcode::Opcode;
use crate::ops::preamble;
use crate::pagecache::PagingOp;
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{self, FuseBmapIn, FuseBmapOut};

/// Outcome of a `pagein`/`pageout` attempt against a direct-I/O vnode: the
/// host UPL still needs to be told whether to commit or abort the pages it
/// handed in, since this layer has no UPL of its own to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingCompletion {
    /// The transfer ran through the page cache; this many bytes moved.
    Transferred(usize),
    /// A direct-I/O vnode can't be paged; the caller already said it will
    /// handle the UPL itself (`nocommit`), so this layer aborted nothing.
    NotSupported,
    /// A direct-I/O vnode can't be paged and the caller did not suppress
    /// the commit step, so this layer aborted the transfer on its behalf.
    Aborted,
}

fn paged_transfer(
    session: &Session,
    node: &Node,
    op: PagingOp,
    offset: u64,
    len: usize,
    nocommit: bool,
) -> Result<PagingCompletion> {
    if node.state().flags.contains(NodeFlags::DIRECT_IO) {
        return Ok(if nocommit { PagingCompletion::NotSupported } else { PagingCompletion::Aborted });
    }
    let n = session
        .pagecache
        .page_transfer(node.nodeid, op, offset, len, session.config.blocksize)
        .map_err(|e| crate::error::Error::Errno(crate::error::Errno(e.raw_os_error().unwrap_or(libc::EIO))))?;
    Ok(PagingCompletion::Transferred(n))
}

/// `pagein(node, offset, len, nocommit)`.
pub fn pagein(session: &Session, node: &Node, offset: u64, len: usize, nocommit: bool) -> Result<PagingCompletion> {
    preamble(session, node, "pagein")?;
    paged_transfer(session, node, PagingOp::PageIn, offset, len, nocommit)
}

/// `pageout(node, offset, len, nocommit)`.
pub fn pageout(session: &Session, node: &Node, offset: u64, len: usize, nocommit: bool) -> Result<PagingCompletion> {
    preamble(session, node, "pageout")?;
    paged_transfer(session, node, PagingOp::PageOut, offset, len, nocommit)
}

/// `strategy(node, op, offset, len)`: the legacy buffer-cache path. A dead
/// session marks the buffer errored and completes it without attempting a
/// transfer at all — modeled here as an immediate error, since it is the
/// host bridge's job to call the buffer-completion routine once this
/// layer reports failure.
pub fn strategy(session: &Session, node: &Node, op: PagingOp, offset: u64, len: usize) -> Result<usize> {
    if session.is_dead() {
        return Err(Error::Dead { disconnected: true });
    }
    preamble(session, node, "strategy")?;
    match paged_transfer(session, node, op, offset, len, true)? {
        PagingCompletion::Transferred(n) => Ok(n),
        _ => Err(Error::NotSupported),
    }
}

/// `blktooff(blk)`: pure blocksize arithmetic, no dispatch.
pub fn blktooff(session: &Session, blk: i64) -> i64 {
    blk * session.config.blocksize as i64
}

/// `offtoblk(off)`: pure blocksize arithmetic, no dispatch.
pub fn offtoblk(session: &Session, off: i64) -> i64 {
    off / session.config.blocksize as i64
}

/// `bmap(node, block)` — named `blockmap` in the BSD vnop table this
/// mirrors (`VNOP_BLOCKMAP`); kept as `bmap` here to match the wire
/// opcode (`FUSE_BMAP`) it dispatches. Capability-gated (§4.1); `ENOSYS` clears the
/// capability bit one-way and surfaces as [`Error::NotImplemented`].
pub fn bmap(session: &Session, node: &Node, block: u64) -> Result<u64> {
    preamble(session, node, "bmap")?;
    let body = FuseBmapIn { block, blocksize: session.config.blocksize, padding: 0 };
    let req = RequestPayload::new(Opcode::Bmap, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    let reply = dispatch::call_optional(session, req)?;
    let out: FuseBmapOut = wire::parse(&reply)?;
    Ok(out.block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namecache::NullNameCache;
    use crate::node::NodeId;
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
    fn pagein_delegates_to_page_cache() {
        let fd = FakeDispatcher::new();
        let session = session_with(fd);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let outcome = pagein(&session, &node, 0, 4096, false).unwrap();
        assert_eq!(outcome, PagingCompletion::Transferred(4096));
    }

    #[test]
    fn pagein_aborts_on_direct_io_when_not_suppressed() {
        let fd = FakeDispatcher::new();
        let session = session_with(fd);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        node.state().flags.insert(NodeFlags::DIRECT_IO);
        let outcome = pagein(&session, &node, 0, 4096, false).unwrap();
        assert_eq!(outcome, PagingCompletion::Aborted);
    }

    #[test]
    fn pagein_reports_not_supported_on_direct_io_when_suppressed() {
        let fd = FakeDispatcher::new();
        let session = session_with(fd);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        node.state().flags.insert(NodeFlags::DIRECT_IO);
        let outcome = pagein(&session, &node, 0, 4096, true).unwrap();
        assert_eq!(outcome, PagingCompletion::NotSupported);
    }

    #[test]
    fn strategy_fails_fast_on_dead_session() {
        let fd = FakeDispatcher::new();
        fd.disconnect();
        let session = session_with(fd);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = strategy(&session, &node, PagingOp::PageIn, 0, 4096).unwrap_err();
        assert!(matches!(err, Error::Dead { disconnected: true }));
    }

    #[test]
    fn blk_offset_roundtrip() {
        let fd = FakeDispatcher::new();
        let session = session_with(fd);
        assert_eq!(blktooff(&session, 2), 2 * session.config.blocksize as i64);
        assert_eq!(offtoblk(&session, session.config.blocksize as i64 * 3), 3);
    }

    #[test]
    fn bmap_dispatches_and_clears_capability_on_enosys() {
        let fd = Arc::new(FakeDispatcher::new());
        let out = FuseBmapOut { block: 42 };
        fd.reply(Opcode::Bmap, out.as_bytes().to_vec());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd.clone(),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        assert_eq!(bmap(&session, &node, 7).unwrap(), 42);

        fd.fail_next(Opcode::Bmap, libc::ENOSYS);
        let err = bmap(&session, &node, 8).unwrap_err();
        assert!(matches!(err, Error::NotImplemented));
        assert!(!session.cap.has(Opcode::Bmap));
    }
}
