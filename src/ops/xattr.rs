//! `getxattr`/`setxattr`/`listxattr`/`removexattr` (§4.6).
//!
//! All four are capability-gated: a daemon that replies `ENOSYS` to any of
//! them has its bit cleared in [`crate::cap::CapabilityMap`] (one-way,
//! §4.1) and the op surfaces as [`Error::NotSupported`], never `ENOSYS`.
//! `AUTO_XATTR` short-circuits the same way *without* touching the
//! capability bit or dispatching at all, since in that mode the host VFS
//! owns xattr storage and this layer is never asked.

use crate::dispatch;
use crate::error::{Errno, Error, Result};
use crate::flags::DataFlags;
use crate::node::Node;
use crate::opcode::Opcode;
use crate::ops::preamble;
use crate::pathname::check_xattr_name;
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{self, FuseGetxattrIn, FuseGetxattrOut, FuseSetxattrIn};

/// Above this payload size a request is marked killable (§4.6, §5
/// Cancellation): large xattr transfers are the one case in this layer
/// where a signal on the calling thread may interrupt an in-flight wait.
const KILLABLE_THRESHOLD: usize = 4096;

/// Result of a `getxattr`/`listxattr` call: either the daemon reports the
/// size the caller's buffer would need (a zero-sized query), or the actual
/// attribute/name-list bytes. Named after the teacher's own `reply::Xattr`
/// shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XattrOutcome {
    /// Caller passed `size == 0`: this is the required buffer size.
    Size(u32),
    /// Caller passed a nonzero `size`: this is the data, already no larger
    /// than what was requested.
    Data(Vec<u8>),
}

fn auto_xattr_gate(session: &Session) -> Result<()> {
    if session.config.data_flags.contains(DataFlags::AUTO_XATTR) {
        return Err(Error::NotSupported);
    }
    Ok(())
}

fn parse_xattr_reply(reply: Vec<u8>, requested_size: u32) -> Result<XattrOutcome> {
    if requested_size == 0 {
        let out: FuseGetxattrOut = wire::parse(&reply)?;
        Ok(XattrOutcome::Size(out.size))
    } else {
        Ok(XattrOutcome::Data(reply))
    }
}

/// `getxattr(node, name, size)`. `size == 0` queries the required buffer
/// size without transferring data.
pub fn getxattr(session: &Session, node: &Node, name: &[u8], size: u32) -> Result<XattrOutcome> {
    preamble(session, node, "getxattr")?;
    check_xattr_name(name, session.config.data_flags)?;
    auto_xattr_gate(session)?;

    let mut body = zerocopy::IntoBytes::as_bytes(&FuseGetxattrIn { size, padding: 0 }).to_vec();
    body.extend_from_slice(name);
    body.push(0);
    let mut req = RequestPayload::new(Opcode::Getxattr, body);
    if size as usize > KILLABLE_THRESHOLD {
        req = req.killable();
    }

    let reply = dispatch::not_implemented_means_unsupported(dispatch::call_optional(session, req))?;
    parse_xattr_reply(reply, size)
}

/// `listxattr(node, size)`: same shape as [`getxattr`] but with no target
/// name — the daemon returns a `\0`-joined list of names it holds for this
/// node.
pub fn listxattr(session: &Session, node: &Node, size: u32) -> Result<XattrOutcome> {
    preamble(session, node, "listxattr")?;
    auto_xattr_gate(session)?;

    let body = zerocopy::IntoBytes::as_bytes(&FuseGetxattrIn { size, padding: 0 }).to_vec();
    let mut req = RequestPayload::new(Opcode::Listxattr, body);
    if size as usize > KILLABLE_THRESHOLD {
        req = req.killable();
    }

    let reply = dispatch::not_implemented_means_unsupported(dispatch::call_optional(session, req))?;
    parse_xattr_reply(reply, size)
}

/// `setxattr(node, name, value, flags)`.
///
/// `value` is taken by shared reference and never consumed: on the
/// `NotSupported` fallback path (capability absent or `AUTO_XATTR`) the
/// caller's own iov/buffer is untouched and can be retried through the
/// host's native xattr path, matching the "preserve and restore the iov
/// descriptor across fallback" contract of §4.6.
pub fn setxattr(session: &Session, node: &Node, name: &[u8], value: &[u8], flags: u32) -> Result<()> {
    preamble(session, node, "setxattr")?;
    check_xattr_name(name, session.config.data_flags)?;
    auto_xattr_gate(session)?;

    let mut body =
        zerocopy::IntoBytes::as_bytes(&FuseSetxattrIn { size: value.len() as u32, flags }).to_vec();
    body.extend_from_slice(name);
    body.push(0);
    body.extend_from_slice(value);
    let mut req = RequestPayload::new(Opcode::Setxattr, body);
    if value.len() > KILLABLE_THRESHOLD {
        req = req.killable();
    }

    dispatch::not_implemented_means_unsupported(dispatch::call_optional(session, req))?;
    Ok(())
}

/// `removexattr(node, name)`.
pub fn removexattr(session: &Session, node: &Node, name: &[u8]) -> Result<()> {
    preamble(session, node, "removexattr")?;
    check_xattr_name(name, session.config.data_flags)?;
    auto_xattr_gate(session)?;

    let mut body = name.to_vec();
    body.push(0);
    let req = RequestPayload::new(Opcode::Removexattr, body);
    dispatch::not_implemented_means_unsupported(dispatch::call_optional(session, req))?;
    Ok(())
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

    fn session_with(fd: FakeDispatcher, flags: DataFlags) -> Arc<Session> {
        let mut cfg = SessionConfig::new("/mnt");
        cfg.data_flags = flags;
        Session::new(cfg, Arc::new(fd), Arc::new(NullNameCache), Arc::new(FakePageCache::default()))
    }

    #[test]
    fn getxattr_empty_name_is_einval() {
        let session = session_with(FakeDispatcher::new(), DataFlags::empty());
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = getxattr(&session, &node, b"", 0).unwrap_err();
        assert!(matches!(err, Error::Errno(e) if e == Errno::EINVAL));
    }

    #[test]
    fn getxattr_apple_namespace_rejected_when_no_applexattr() {
        let session = session_with(FakeDispatcher::new(), DataFlags::NO_APPLEXATTR);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = getxattr(&session, &node, b"com.apple.quarantine", 0).unwrap_err();
        assert!(matches!(err, Error::Errno(e) if e == Errno::EPERM));
    }

    #[test]
    fn auto_xattr_short_circuits_without_dispatch() {
        let fd = FakeDispatcher::new();
        let session = session_with(fd, DataFlags::AUTO_XATTR);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = getxattr(&session, &node, b"user.x", 0).unwrap_err();
        assert!(matches!(err, Error::NotSupported));
    }

    #[test]
    fn getxattr_missing_capability_is_not_supported_without_dispatch() {
        let fd = Arc::new(FakeDispatcher::new());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd.clone(),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        session.cap.clear(Opcode::Getxattr);
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = getxattr(&session, &node, b"user.x", 0).unwrap_err();
        assert!(matches!(err, Error::NotSupported));
        assert_eq!(fd.call_count(Opcode::Getxattr), 0);
    }

    #[test]
    fn getxattr_live_enosys_clears_capability_and_returns_not_supported() {
        let fd = Arc::new(FakeDispatcher::new());
        fd.fail_next(Opcode::Getxattr, libc::ENOSYS);
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd.clone(),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = getxattr(&session, &node, b"user.x", 0).unwrap_err();
        assert!(matches!(err, Error::NotSupported));
        assert!(!session.cap.has(Opcode::Getxattr));
    }

    #[test]
    fn getxattr_size_query_parses_size_reply() {
        let fd = Arc::new(FakeDispatcher::new());
        let out = FuseGetxattrOut { size: 42, padding: 0 };
        fd.reply(Opcode::Getxattr, out.as_bytes().to_vec());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd,
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let outcome = getxattr(&session, &node, b"user.x", 0).unwrap();
        assert_eq!(outcome, XattrOutcome::Size(42));
    }

    #[test]
    fn getxattr_data_query_returns_raw_bytes() {
        let fd = Arc::new(FakeDispatcher::new());
        fd.reply(Opcode::Getxattr, b"hello".to_vec());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd,
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let outcome = getxattr(&session, &node, b"user.x", 16).unwrap();
        assert_eq!(outcome, XattrOutcome::Data(b"hello".to_vec()));
    }

    #[test]
    fn setxattr_auto_xattr_never_dispatches() {
        let fd = Arc::new(FakeDispatcher::new());
        let mut cfg = SessionConfig::new("/mnt");
        cfg.data_flags = DataFlags::AUTO_XATTR;
        let session =
            Session::new(cfg, fd.clone(), Arc::new(NullNameCache), Arc::new(FakePageCache::default()));
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = setxattr(&session, &node, b"user.x", b"value", 0).unwrap_err();
        assert!(matches!(err, Error::NotSupported));
        assert_eq!(fd.call_count(Opcode::Setxattr), 0);
    }

    #[test]
    fn setxattr_dispatches_with_name_and_value() {
        let fd = Arc::new(FakeDispatcher::new());
        fd.reply(Opcode::Setxattr, Vec::new());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd.clone(),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        setxattr(&session, &node, b"user.x", b"value", 0).unwrap();
        assert_eq!(fd.call_count(Opcode::Setxattr), 1);
    }

    #[test]
    fn removexattr_rejects_empty_name() {
        let session = session_with(FakeDispatcher::new(), DataFlags::empty());
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let err = removexattr(&session, &node, b"").unwrap_err();
        assert!(matches!(err, Error::Errno(e) if e == Errno::EINVAL));
    }

    #[test]
    fn listxattr_dispatches_without_a_name() {
        let fd = Arc::new(FakeDispatcher::new());
        fd.reply(Opcode::Listxattr, b"user.a\0user.b\0".to_vec());
        let session = Session::new(
            SessionConfig::new("/mnt"),
            fd.clone(),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        let node = Arc::new(Node::new(NodeId(5), NodeId::ROOT, false, 1));
        let outcome = listxattr(&session, &node, 64).unwrap();
        assert_eq!(outcome, XattrOutcome::Data(b"user.a\0user.b\0".to_vec()));
    }
}
