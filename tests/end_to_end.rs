//! End-to-end scenarios exercised against the public `ops::*` entry points
//! and the `test-util` fakes, one per §8 "End-to-end scenarios" of the
//! specification this crate implements. Analogous to the teacher's own
//! `tests/integration_tests.rs`, simplified since there is no real mount
//! to drive — the in-memory `Dispatcher`/`PageCache` fakes stand in for it.

use std::sync::Arc;

use vnodeops::namecache::NullNameCache;
use vnodeops::node::{AccessClass, Node, NodeId};
use vnodeops::ops::lookup::lookup;
use vnodeops::ops::open::{close, create, open, CreateOutcome};
use vnodeops::ops::xattr::getxattr;
use vnodeops::ops::{lifecycle, NameiContext};
use vnodeops::session::{Session, SessionConfig};
use vnodeops::test_support::{FakeDispatcher, FakePageCache};
use vnodeops::wire::{FuseAttr, FuseEntryOut, FuseGetxattrOut, FuseOpenOut};
use vnodeops::{Error, NodeFlags, OpenFlags, Opcode};

use zerocopy::IntoBytes;

fn session(fd: Arc<FakeDispatcher>) -> Arc<Session> {
    Session::new(SessionConfig::new("/mnt"), fd, Arc::new(NullNameCache), Arc::new(FakePageCache::default()))
}

fn sample_attr(nodeid: u64, mode: u32) -> FuseAttr {
    FuseAttr {
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
    }
}

fn sample_entry(nodeid: u64, mode: u32) -> FuseEntryOut {
    FuseEntryOut {
        nodeid,
        generation: 1,
        entry_valid: 1,
        attr_valid: 1,
        entry_valid_nsec: 0,
        attr_valid_nsec: 0,
        attr: sample_attr(nodeid, mode),
    }
}

/// Scenario 1: create on a daemon without the CREATE capability falls
/// back to MKNOD, never retrying CREATE, and instantiates the new vnode
/// with `nlookup == 1` and no handle preinstalled.
#[test]
fn create_on_legacy_daemon_falls_back_to_mknod() {
    let fd = Arc::new(FakeDispatcher::new());
    fd.fail_next(Opcode::Create, libc::ENOSYS);
    fd.reply(Opcode::Mknod, sample_entry(9, libc::S_IFREG as u32 | 0o644).as_bytes().to_vec());
    let session = session(fd.clone());
    let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
    session.registry.insert(root.clone());

    let outcome = create(&session, &root, b"f", 0o644, 0o022, libc::O_RDWR).unwrap();
    let node = match outcome {
        CreateOutcome::FellBackToMknod { node, attr } => {
            assert_eq!(node.nodeid, NodeId(9));
            assert_eq!(node.nlookup(), 1);
            assert!(!node.state().fufh.is_valid(AccessClass::ReadWrite));
            assert_eq!(attr.size, 0);
            node
        }
        CreateOutcome::Created { .. } => panic!("expected MKNOD fallback, got CREATE fast path"),
    };
    assert_eq!(fd.call_count(Opcode::Create), 1);
    assert_eq!(fd.call_count(Opcode::Mknod), 1);
    assert!(!session.cap.has(Opcode::Create));

    // A subsequent open on the fresh-from-MKNOD vnode issues its own OPEN.
    fd.reply(Opcode::Open, FuseOpenOut { fh: 5, open_flags: 0, padding: 0 }.as_bytes().to_vec());
    let fh = open(&session, &node, OpenFlags(libc::O_RDWR)).unwrap();
    assert_eq!(fh, 5);
    assert_eq!(fd.call_count(Opcode::Open), 1);
}

/// Scenario 2: create on a modern daemon pre-installs the returned handle
/// in the RDWR slot; a subsequent `open` reuses it (refcount 2), and two
/// `close` calls collapse to exactly one RELEASE.
#[test]
fn create_on_modern_daemon_preinstalls_handle_and_close_balances() {
    let fd = Arc::new(FakeDispatcher::new());
    let mut reply = sample_entry(7, libc::S_IFREG as u32 | 0o644).as_bytes().to_vec();
    reply.extend_from_slice(FuseOpenOut { fh: 42, open_flags: 0, padding: 0 }.as_bytes());
    fd.reply(Opcode::Create, reply);
    let session = session(fd.clone());
    let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
    session.registry.insert(root.clone());

    let outcome = create(&session, &root, b"f", 0o644, 0o022, libc::O_RDWR).unwrap();
    let (node, fh) = match outcome {
        CreateOutcome::Created { node, fh, .. } => (node, fh),
        CreateOutcome::FellBackToMknod { .. } => panic!("expected CREATE fast path"),
    };
    assert_eq!(fh, 42);
    assert!(node.state().fufh.is_valid(AccessClass::ReadWrite));

    // open() reuses the preinstalled slot rather than dispatching OPEN.
    let reused = open(&session, &node, OpenFlags(libc::O_RDWR)).unwrap();
    assert_eq!(reused, 42);
    assert_eq!(fd.call_count(Opcode::Open), 0);

    fd.reply(Opcode::Release, Vec::new());
    close(&session, &node, AccessClass::ReadWrite, false, false).unwrap();
    assert_eq!(fd.call_count(Opcode::Release), 0, "first close must not release with refcount 2");
    close(&session, &node, AccessClass::ReadWrite, false, false).unwrap();
    assert_eq!(fd.call_count(Opcode::Release), 1, "second close drains the slot to zero");
}

/// Scenario 3: a direct-I/O read chunks to the session's iosize and a
/// short mid-stream reply terminates the loop early.
#[test]
fn direct_io_read_chunks_and_stops_on_short_reply() {
    let fd = Arc::new(FakeDispatcher::new());
    fd.reply(Opcode::Read, vec![0u8; 4096]);
    fd.reply(Opcode::Read, vec![0u8; 500]); // short: terminates the loop
    let mut cfg = SessionConfig::new("/mnt");
    cfg.iosize = 4096;
    let session = Session::new(cfg, fd.clone(), Arc::new(NullNameCache), Arc::new(FakePageCache::default()));

    let node = Arc::new(Node::new(NodeId(11), NodeId::ROOT, false, 1));
    node.state().flags |= NodeFlags::DIRECT_IO;
    node.state().fufh.install_opened(AccessClass::ReadOnly, 77, 0);
    session.registry.insert(node.clone());

    let mut buf = vec![0u8; 9000];
    let n = vnodeops::ops::io::read(&session, &node, vnodeops::FileType::RegularFile, 0, &mut buf).unwrap();
    assert_eq!(n, 4096 + 500);
    assert_eq!(fd.call_count(Opcode::Read), 2);
}

/// Scenario 4: an Apple-double name is rejected at `lookup` before any
/// dispatch happens.
#[test]
fn apple_double_lookup_short_circuits_without_dispatch() {
    let fd = Arc::new(FakeDispatcher::new());
    let session = session(fd.clone());
    let root = Arc::new(Node::new(NodeId::ROOT, NodeId::ROOT, true, 1));
    session.registry.insert(root.clone());

    let err = lookup(&session, &root, b"._foo", NameiContext::plain_lookup()).unwrap_err();
    assert!(matches!(err, Error::Errno(e) if e == vnodeops::Errno::ENOENT));
    assert!(fd.calls().is_empty());
}

/// Scenario 5: xattr capability-gated fallback. A session with the
/// GETXATTR bit already cleared never dispatches; a live ENOSYS reply
/// clears the bit and answers NotSupported from then on.
#[test]
fn xattr_capability_fallback() {
    let fd = Arc::new(FakeDispatcher::new());
    let session = session(fd.clone());
    let node = Arc::new(Node::new(NodeId(3), NodeId::ROOT, false, 1));

    session.cap.clear(Opcode::Getxattr);
    let err = getxattr(&session, &node, b"user.x", 0).unwrap_err();
    assert!(matches!(err, Error::NotSupported));
    assert_eq!(fd.call_count(Opcode::Getxattr), 0);

    // A fresh session where the capability starts present: the first live
    // ENOSYS both answers NotSupported and clears the bit for good.
    let fd2 = Arc::new(FakeDispatcher::new());
    fd2.fail_next(Opcode::Getxattr, libc::ENOSYS);
    let session2 = session(fd2.clone());
    let node2 = Arc::new(Node::new(NodeId(3), NodeId::ROOT, false, 1));
    let err = getxattr(&session2, &node2, b"user.x", 16).unwrap_err();
    assert!(matches!(err, Error::NotSupported));
    assert!(!session2.cap.has(Opcode::Getxattr));

    fd2.reply(Opcode::Getxattr, FuseGetxattrOut { size: 99, padding: 0 }.as_bytes().to_vec());
    let err2 = getxattr(&session2, &node2, b"user.x", 0).unwrap_err();
    assert!(matches!(err2, Error::NotSupported));
    assert_eq!(fd2.call_count(Opcode::Getxattr), 1, "capability stays cleared, no second dispatch");
}

/// Scenario 6: reclaim drains every valid slot (one RELEASE per slot) and
/// discharges the full outstanding `nlookup` in a single FORGET.
#[test]
fn reclaim_drains_handles_and_forgets_outstanding_lookups() {
    let fd = Arc::new(FakeDispatcher::new());
    let session = session(fd.clone());
    let node = Arc::new(Node::new(NodeId(21), NodeId::ROOT, false, 3));
    node.state().fufh.install_opened(AccessClass::ReadOnly, 1, 0);
    node.state().fufh.inc(AccessClass::ReadOnly);
    node.state().fufh.install_opened(AccessClass::ReadWrite, 2, 0);
    session.registry.insert(node.clone());

    lifecycle::reclaim(&session, &node).unwrap();

    assert_eq!(fd.call_count(Opcode::Release), 2);
    assert_eq!(fd.call_count(Opcode::Forget), 1);
    assert!(session.node(NodeId(21)).is_none());
}
