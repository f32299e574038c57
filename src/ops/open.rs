//! `open`/`close`/`create`/`mmap`/`mnomap`/`ioctl` (C1 §4.2, C6 §4.6).

use std::sync::Arc;

use crate::attr::file_attr_from_wire;
use crate::dispatch;
use crate::error::{Errno, Error, Result};
use crate::flags::NodeFlags;
use crate::ll::flags::fopen_flags::FopenFlags;
use crate::ll::flags::ioctl_flags::IoctlFlags;
use crate::node::{AccessClass, Node, NodeId, OpenOutcome};
use crate::opcode::Opcode;
use crate::open_flags::OpenFlags;
use crate::ops::preamble;
use crate::pathname::{check_name_length, reject_apple_double_create, reject_embedded_nul};
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{self, FuseCreateIn, FuseEntryOut, FuseIoctlIn, FuseIoctlOut, FuseMknodIn, FuseOpenIn, FuseOpenOut};
use crate::FileAttr;

fn parse_open_outcome(bytes: &[u8]) -> Result<OpenOutcome> {
    let out: FuseOpenOut = wire::parse(bytes)?;
    let flags = FopenFlags::from_bits_truncate(out.open_flags);
    Ok(OpenOutcome {
        fh: out.fh,
        direct_io: flags.contains(FopenFlags::FOPEN_DIRECT_IO),
        purge_ubc: cfg!(target_os = "macos") && flags.bits() & (1 << 31) != 0,
        purge_attr: cfg!(target_os = "macos") && flags.bits() & (1 << 30) != 0,
        keep_cache: flags.contains(FopenFlags::FOPEN_KEEP_CACHE),
        nonseekable: flags.contains(FopenFlags::FOPEN_NONSEEKABLE),
    })
}

fn send_open(session: &Session, node: &Node, wire_flags: u32, is_dir: bool) -> Result<OpenOutcome> {
    let body = FuseOpenIn { flags: wire_flags, unused: 0 };
    let opcode = if is_dir { Opcode::Opendir } else { Opcode::Open };
    let req = RequestPayload::new(opcode, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    let result = dispatch::call(session, req);
    if let Err(Error::Errno(e)) = &result {
        if *e == Errno::ENOENT {
            session.namecache.purge(node.nodeid);
        }
    }
    let bytes = result?;
    parse_open_outcome(&bytes)
}

fn apply_open_side_effects(session: &Session, node: &Node, outcome: OpenOutcome) -> Result<()> {
    if outcome.direct_io {
        session.pagecache.msync(node.nodeid)?;
        session.pagecache.invalidate(node.nodeid);
        session.pagecache.set_readahead(node.nodeid, false);
        node.state().flags |= NodeFlags::DIRECT_IO;
    } else if outcome.purge_ubc {
        session.pagecache.msync(node.nodeid)?;
        session.pagecache.invalidate(node.nodeid);
        if outcome.purge_attr {
            node.invalidate_attr();
            let attr = crate::ops::attr::getattr(session, node, false)?;
            node.set_filesize(attr.size);
            session.pagecache.setsize(node.nodeid, attr.size);
        }
    }
    Ok(())
}

/// `open(node, flags)`: select class, reuse or acquire a handle.
pub fn open(session: &Session, node: &Node, flags: OpenFlags) -> Result<u64> {
    preamble(session, node, "open")?;
    let class = AccessClass::from_open_flags(flags);
    let is_dir = node.is_dir();
    let mut captured = None;
    let fh = node.get_handle(class, || {
        let outcome = send_open(session, node, flags.0 as u32, is_dir)?;
        captured = Some(outcome);
        Ok(outcome)
    })?;
    if let Some(outcome) = captured {
        apply_open_side_effects(session, node, outcome)?;
    }
    Ok(fh)
}

/// `close(node, class, dirty, host_no_delay)` (§4.6).
pub fn close(
    session: &Session,
    node: &Node,
    class: AccessClass,
    dirty: bool,
    host_no_delay: bool,
) -> Result<()> {
    // close is one of the dead-session-exempt ops (§4.6 preamble): always
    // returns success rather than short-circuiting to ENXIO.
    if host_no_delay {
        return Ok(());
    }
    if !node.is_dir()
        && dirty
        && !session.config.data_flags.contains(crate::flags::DataFlags::NO_SYNCONCLOSE)
    {
        let _ = session.pagecache.msync(node.nodeid);
    }
    if session.cap.has(Opcode::Flush) {
        if let Some(fh) = node.state().fufh.fh(class) {
            let body = crate::wire::FuseFlushIn { fh, unused: 0, padding: 0, lock_owner: 0 };
            let req = RequestPayload::new(Opcode::Flush, zerocopy::IntoBytes::as_bytes(&body).to_vec());
            // flush errors are logged, never propagated (§4.1 fallback policy).
            let _ = dispatch::call_optional(session, req);
        }
    }
    if let Some(id) = node.put_handle(class) {
        send_release(session, node, id, node.is_dir());
    }
    Ok(())
}

fn send_release(session: &Session, _node: &Node, fh: u64, is_dir: bool) {
    let body = crate::wire::FuseReleaseIn { fh, flags: 0, release_flags: 0, lock_owner: 0 };
    let opcode = if is_dir { Opcode::Releasedir } else { Opcode::Release };
    let req = RequestPayload::new(opcode, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    let _ = dispatch::call(session, req);
}

/// `create(parent, name, mode, umask, flags)`: CREATE fast path with
/// MKNOD fallback (§4.2, §4.6).
pub enum CreateOutcome {
    /// `CREATE` succeeded: the returned handle is pre-installed in the
    /// `ReadWrite` slot.
    Created { node: Arc<Node>, attr: FileAttr, fh: u64 },
    /// `CREATE` was unavailable; caller must now `open` separately.
    FellBackToMknod { node: Arc<Node>, attr: FileAttr },
}

pub fn create(
    session: &Session,
    parent: &Node,
    name: &[u8],
    mode: u32,
    umask: u32,
    flags: i32,
) -> Result<CreateOutcome> {
    preamble(session, parent, "create")?;
    check_name_length(name)?;
    reject_embedded_nul(name)?;
    reject_apple_double_create(name)?;

    if session.cap.has(Opcode::Create) {
        match try_create(session, parent, name, mode, umask, flags) {
            Ok(outcome) => return Ok(outcome),
            Err(Error::NotImplemented) => {} // fall through to MKNOD
            Err(e) => return Err(e),
        }
    }
    let node = mknod_regular(session, parent, name, mode, umask)?;
    let attr = node.cached_attr().ok_or(Error::Protocol("mknod entry missing cached attr"))?;
    session.namecache.purge_negatives(parent.nodeid);
    Ok(CreateOutcome::FellBackToMknod { node, attr })
}

fn try_create(
    session: &Session,
    parent: &Node,
    name: &[u8],
    mode: u32,
    umask: u32,
    flags: i32,
) -> Result<CreateOutcome> {
    let mut body = zerocopy::IntoBytes::as_bytes(&FuseCreateIn {
        flags: flags as u32,
        mode,
        umask,
        padding: 0,
    })
    .to_vec();
    body.extend_from_slice(name);
    body.push(0);
    let req = RequestPayload::new(Opcode::Create, body);
    let reply = dispatch::call_optional(session, req)?;

    // entry_out followed by open_out in the reply body.
    let entry_size = std::mem::size_of::<FuseEntryOut>();
    if reply.len() < entry_size {
        return Err(Error::Protocol("create reply too short"));
    }
    let entry: FuseEntryOut = wire::parse(&reply[..entry_size])?;
    let open_out: FuseOpenOut = wire::parse(&reply[entry_size..])?;

    let kind = crate::attr::kind_from_mode(entry.attr.mode)?;
    if kind != crate::FileType::RegularFile {
        // Not a regular file: compensate with RELEASE, mirror
        // fuse_internal_checkentry rejection (SPEC_FULL §4.2/§4.6).
        send_release(session, parent, open_out.fh, false);
        return Err(Error::Protocol("create reply is not a regular file"));
    }

    let nodeid = NodeId(entry.nodeid);
    let attr = match file_attr_from_wire(nodeid, &entry.attr) {
        Ok(a) => a,
        Err(e) => {
            send_release(session, parent, open_out.fh, false);
            return Err(e);
        }
    };

    let node = Arc::new(Node::new(nodeid, parent.nodeid, false, 1));
    node.cache_attr(attr, std::time::Duration::from_secs(entry.attr_valid));
    node.state().fufh.install_created(open_out.fh, open_out.open_flags);
    session.registry.insert(node.clone());
    session.namecache.purge_negatives(parent.nodeid);
    Ok(CreateOutcome::Created { node, attr, fh: open_out.fh })
}

fn mknod_regular(session: &Session, parent: &Node, name: &[u8], mode: u32, umask: u32) -> Result<Arc<Node>> {
    let _ = umask;
    let mut body = zerocopy::IntoBytes::as_bytes(&FuseMknodIn { mode, rdev: 0 }).to_vec();
    body.extend_from_slice(name);
    body.push(0);
    let req = RequestPayload::new(Opcode::Mknod, body);
    let reply = match dispatch::call(session, req) {
        Ok(r) => r,
        Err(e) => return Err(e),
    };
    let entry: FuseEntryOut = wire::parse(&reply)?;
    let nodeid = NodeId(entry.nodeid);
    let attr = match file_attr_from_wire(nodeid, &entry.attr) {
        Ok(a) => a,
        Err(e) => {
            // compensating FORGET since MKNOD (unlike CREATE) never
            // installed a handle (§4.2 undo labels).
            let forget = crate::wire::FuseForgetIn { nlookup: 1 };
            let req = RequestPayload::new(
                Opcode::Forget,
                zerocopy::IntoBytes::as_bytes(&forget).to_vec(),
            );
            let _ = dispatch::call(session, req);
            return Err(e);
        }
    };
    let node = Arc::new(Node::new(nodeid, parent.nodeid, false, 1));
    node.cache_attr(attr, std::time::Duration::from_secs(entry.attr_valid));
    session.registry.insert(node.clone());
    Ok(node)
}

/// `mmap(node, prot)` (§4.2 class derivation, §4.6 fallback).
pub fn mmap(session: &Session, node: &Node, prot: i32) -> Result<u64> {
    preamble(session, node, "mmap")?;
    let class = AccessClass::from_mmap_prot(prot);
    match node.get_handle(class, || send_open(session, node, 0, node.is_dir())) {
        Ok(fh) => Ok(fh),
        Err(Error::Errno(e)) if e == Errno::EACCES => {
            if let Some(fallback) = class.mmap_fallback() {
                node.get_handle(fallback, || send_open(session, node, 0, node.is_dir()))
            } else {
                Err(Error::Errno(e))
            }
        }
        Err(e) => Err(e),
    }
}

/// `mnomap` is a no-op; handle teardown is deferred to `inactive`/`reclaim`.
pub fn mnomap(_session: &Session, _node: &Node) -> Result<()> {
    Ok(())
}

/// `ioctl(node, class, cmd, in_data, out_size, flags)` (§4.6).
///
/// NOTE (§9 Open Question): the original tests `flags & (IOC_IN|IOC_OUT)`
/// with bitwise-OR where AND was intended, making the condition
/// constant-true. This crate deliberately does **not** mirror that bug
/// (see DESIGN.md) and uses `&` so the in/out buffer handling matches the
/// documented intent.
pub fn ioctl(
    session: &Session,
    node: &Node,
    class: AccessClass,
    cmd: u32,
    in_data: &[u8],
    out_size: u32,
    flags: IoctlFlags,
) -> Result<(i32, Vec<u8>)> {
    preamble(session, node, "ioctl")?;
    let fh = node.state().fufh.fh(class).ok_or(Error::Errno(Errno::EIO))?;

    const FUSE_IOC_IN: u32 = 1;
    const FUSE_IOC_OUT: u32 = 2;
    let raw_flags = flags.bits();

    let mut body = zerocopy::IntoBytes::as_bytes(&FuseIoctlIn {
        fh,
        flags: raw_flags,
        cmd,
        arg: 0,
        in_size: if raw_flags & FUSE_IOC_IN != 0 { in_data.len() as u32 } else { 0 },
        out_size: if raw_flags & FUSE_IOC_OUT != 0 { out_size } else { 0 },
    })
    .to_vec();
    if raw_flags & FUSE_IOC_IN != 0 {
        body.extend_from_slice(in_data);
    }

    let req = RequestPayload::new(Opcode::Ioctl, body);
    let reply = dispatch::not_implemented_means_unsupported(dispatch::call_optional(session, req))?;

    let out_header = std::mem::size_of::<FuseIoctlOut>();
    if reply.len() < out_header {
        return Err(Error::Protocol("ioctl reply too short"));
    }
    let out: FuseIoctlOut = wire::parse(&reply[..out_header])?;
    Ok((out.result, reply[out_header..].to_vec()))
}
