//! `getattr`/`setattr` (§4.3, §4.6).

use std::time::Duration;

use crate::attr::{file_attr_from_wire, kind_from_mode, root_fallback_attr};
use crate::dispatch;
use crate::error::{Errno, Error, Result};
use crate::flags::{ChangeFlags, NodeFlags};
use crate::ll::flags::fattr_flags::FattrFlags;
use crate::ll::flags::getattr_flags::GetattrFlags;
use crate::node::Node;
use crate::opcode::Opcode;
use crate::ops::preamble;
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{self, FuseAttrOut, FuseGetattrIn, FuseSetattrIn};
use crate::{FileAttr, FileType};

/// Host VFS attribute-change vector for `setattr`; fields left `None` are
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct SetattrRequest {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<(i64, u32)>,
    pub mtime: Option<(i64, u32)>,
    pub fh: Option<u64>,
}

impl SetattrRequest {
    /// Wire `fuse_setattr_in.valid` bits this layer translates the VFS
    /// attribute vector into (§4.6 `setattr`).
    fn valid_bits(&self) -> FattrFlags {
        let mut v = FattrFlags::empty();
        if self.mode.is_some() {
            v |= FattrFlags::FATTR_MODE;
        }
        if self.uid.is_some() {
            v |= FattrFlags::FATTR_UID;
        }
        if self.gid.is_some() {
            v |= FattrFlags::FATTR_GID;
        }
        if self.size.is_some() {
            v |= FattrFlags::FATTR_SIZE;
        }
        if self.atime.is_some() {
            v |= FattrFlags::FATTR_ATIME;
        }
        if self.mtime.is_some() {
            v |= FattrFlags::FATTR_MTIME;
        }
        if self.fh.is_some() {
            v |= FattrFlags::FATTR_FH;
        }
        v
    }
}

/// `getattr(node, caller_holds_own_buffer)`.
///
/// `caller_holds_own_buffer` models the original's `vap != VTOVA(vp)`
/// check (SPEC_FULL §4.6): when `true`, a fresh cache entry may be served
/// without dispatch; the host VFS glue is responsible for passing `false`
/// when it wants to force a round trip (e.g. coming from `setattr`'s
/// post-update sanity read).
pub fn getattr(session: &Session, node: &Node, caller_holds_own_buffer: bool) -> Result<FileAttr> {
    if session.is_dead() {
        if node.nodeid.is_root() {
            return Ok(root_fallback_attr(session.config.daemon_uid, session.config.daemon_gid));
        }
        return Err(Error::Dead { disconnected: true });
    }
    preamble(session, node, "getattr")?;

    if caller_holds_own_buffer {
        if let Some(attr) = node.cached_attr() {
            return Ok(attr);
        }
    }

    let fh = node.state().fufh.fh(crate::node::AccessClass::ReadWrite);
    let getattr_flags = if fh.is_some() { GetattrFlags::FUSE_GETATTR_FH } else { GetattrFlags::empty() };
    let body = FuseGetattrIn { getattr_flags: getattr_flags.bits(), dummy: 0, fh: fh.unwrap_or(0) };
    let req = RequestPayload::new(Opcode::Getattr, zerocopy::IntoBytes::as_bytes(&body).to_vec());

    let reply = match dispatch::call(session, req) {
        Ok(r) => r,
        Err(Error::Dead { disconnected: true }) if node.nodeid.is_root() => {
            return Ok(root_fallback_attr(session.config.daemon_uid, session.config.daemon_gid));
        }
        Err(Error::Errno(e)) if e == Errno::ENOENT => {
            session.namecache.purge(node.nodeid);
            return Err(Error::Errno(Errno::ENOENT));
        }
        Err(e) => return Err(e),
    };

    let out: FuseAttrOut = wire::parse(&reply)?;
    let new_kind = match kind_from_mode(out.attr.mode) {
        Ok(k) => k,
        Err(e) => {
            session.namecache.purge(node.nodeid);
            return Err(e);
        }
    };
    let previous_kind = node.cached_attr().map(|a| a.kind);
    if let Some(prev) = previous_kind {
        if prev != new_kind {
            session.namecache.purge(node.nodeid);
            return Err(Error::Errno(Errno::EIO));
        }
    }

    let attr = file_attr_from_wire(node.nodeid, &out.attr)?;
    node.cache_attr(
        attr,
        Duration::from_nanos(out.attr_valid * 1_000_000_000 + u64::from(out.attr_valid_nsec)),
    );

    // ATTR_FUDGE (§9, §4.6): filesize is updated from the reply only for
    // direct-I/O regular files, mirroring the original rather than fixing it.
    if new_kind == FileType::RegularFile && node.state().flags.contains(NodeFlags::DIRECT_IO) {
        node.set_filesize(attr.size);
        session.pagecache.setsize(node.nodeid, attr.size);
    }

    Ok(attr)
}

/// `setattr(node, req, is_readonly_mount)`.
pub fn setattr(
    session: &Session,
    node: &Node,
    req: &SetattrRequest,
    readonly_mount: bool,
) -> Result<FileAttr> {
    preamble(session, node, "setattr")?;

    if req.size.is_some() && node.is_dir() {
        return Err(Error::Errno(Errno::EISDIR));
    }
    if readonly_mount {
        return Err(Error::Errno(Errno::EROFS));
    }

    let body = FuseSetattrIn {
        valid: req.valid_bits().bits(),
        padding: 0,
        fh: req.fh.unwrap_or(0),
        size: req.size.unwrap_or(0),
        lock_owner: 0,
        atime: req.atime.map(|(s, _)| s).unwrap_or(0),
        mtime: req.mtime.map(|(s, _)| s).unwrap_or(0),
        ctime: 0,
        atimensec: req.atime.map(|(_, n)| n).unwrap_or(0),
        mtimensec: req.mtime.map(|(_, n)| n).unwrap_or(0),
        ctimensec: 0,
        mode: req.mode.unwrap_or(0),
        unused4: 0,
        uid: req.uid.unwrap_or(0),
        gid: req.gid.unwrap_or(0),
        unused5: 0,
        bkuptime: 0,
        chgtime: 0,
        crtime: 0,
        bkuptimensec: 0,
        chgtimensec: 0,
        crtimensec: 0,
        flags: 0,
    };
    let wreq = RequestPayload::new(Opcode::Setattr, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    let reply = dispatch::call(session, wreq)?;
    let out: FuseAttrOut = wire::parse(&reply)?;

    let new_kind = kind_from_mode(out.attr.mode)?;
    let previous_kind = node.cached_attr().map(|a| a.kind);
    if let Some(prev) = previous_kind {
        if prev != new_kind {
            session.namecache.purge(node.nodeid);
            return Err(Error::Errno(Errno::EAGAIN));
        }
    }

    let attr = file_attr_from_wire(node.nodeid, &out.attr)?;
    if req.size.is_some() {
        node.set_filesize(attr.size);
        session.pagecache.setsize(node.nodeid, attr.size);
    }
    node.invalidate_attr();
    node.cache_attr(
        attr,
        Duration::from_nanos(out.attr_valid * 1_000_000_000 + u64::from(out.attr_valid_nsec)),
    );
    node.state().c_flag.remove(ChangeFlags::TOUCH_CHGTIME);
    Ok(attr)
}
