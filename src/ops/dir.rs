//! `readdir`, `mkdir`/`mknod`/`symlink`, `rmdir`/`remove`, `link`,
//! `rename`, `exchange` (§4.6).

use std::sync::Arc;

use crate::attr::{file_attr_from_wire, kind_from_mode};
use crate::dispatch;
use crate::error::{Errno, Error, Result};
use crate::node::{AccessClass, Node, NodeId};
use crate::opcode::Opcode;
use crate::ops::preamble;
use crate::ll::flags::read_flags::ReadFlags;
use crate::pathname::{check_name_length, reject_apple_double_create, reject_embedded_nul};
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{self, FuseDirent, FuseExchangeIn, FuseForgetIn, FuseLinkIn, FuseMkdirIn, FuseMknodIn, FuseRenameIn};
use crate::FileAttr;

/// One decoded directory entry, handed back to the host VFS glue which
/// owns the actual dirent-buffer encoding.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub ino: u64,
    pub off: u64,
    pub kind: u32,
    pub name: Vec<u8>,
}

/// `readdir(node, fh_or_none, min_entries_hint)`. Requires an `RDONLY`
/// directory handle, acquiring one if absent (and incrementing its refcount
/// if already valid); the reference taken here is always released before
/// returning (§4.6). Attrs invalidated unconditionally since directory
/// contents may have changed.
pub fn readdir(session: &Session, node: &Node, min_entries: usize) -> Result<Vec<DirEntry>> {
    preamble(session, node, "readdir")?;
    if !node.is_dir() {
        return Err(Error::Errno(Errno::ENOTDIR));
    }

    let fh = crate::ops::open::open(
        session,
        node,
        crate::open_flags::OpenFlags(libc::O_RDONLY),
    )?;

    let result = dispatch_readdir(session, fh, min_entries);

    // `open` above always incremented the RDONLY slot's refcount, whether it
    // was cold or already valid; the matching decrement here must run
    // unconditionally, releasing only once the count actually reaches zero
    // (mirrors `open::close`'s borrow/release pattern).
    if let Some(id) = node.put_handle(AccessClass::ReadOnly) {
        let body = crate::wire::FuseReleaseIn { fh: id, flags: 0, release_flags: 0, lock_owner: 0 };
        let req = RequestPayload::new(Opcode::Releasedir, zerocopy::IntoBytes::as_bytes(&body).to_vec());
        let _ = dispatch::call(session, req);
    }

    node.invalidate_attr();
    result
}

fn dispatch_readdir(session: &Session, fh: u64, min_entries: usize) -> Result<Vec<DirEntry>> {
    let size = (min_entries.max(1) * 256) as u32;
    let body = crate::wire::FuseReadIn {
        fh,
        offset: 0,
        size,
        read_flags: ReadFlags::empty().bits(),
        lock_owner: 0,
        flags: 0,
        padding: 0,
    };
    let req = RequestPayload::new(Opcode::Readdir, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    let reply = dispatch::call(session, req)?;
    decode_dirent_stream(&reply)
}

fn decode_dirent_stream(bytes: &[u8]) -> Result<Vec<DirEntry>> {
    let header_size = std::mem::size_of::<FuseDirent>();
    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos + header_size <= bytes.len() {
        let header: FuseDirent = wire::parse(&bytes[pos..pos + header_size])?;
        let namelen = header.namelen as usize;
        let name_start = pos + header_size;
        if name_start + namelen > bytes.len() {
            return Err(Error::Protocol("truncated dirent name"));
        }
        let name = bytes[name_start..name_start + namelen].to_vec();
        entries.push(DirEntry { ino: header.ino, off: header.off, kind: header.kind, name });
        let entry_len = header_size + namelen;
        let padded = entry_len.div_ceil(8) * 8;
        pos += padded;
    }
    Ok(entries)
}

/// `mkdir(parent, name, mode, umask)`.
pub fn mkdir(session: &Session, parent: &Node, name: &[u8], mode: u32, _umask: u32) -> Result<(Arc<Node>, FileAttr)> {
    preamble(session, parent, "mkdir")?;
    check_name_length(name)?;
    reject_embedded_nul(name)?;
    reject_apple_double_create(name)?;
    let mut body = zerocopy::IntoBytes::as_bytes(&FuseMkdirIn { mode, padding: 0 }).to_vec();
    body.extend_from_slice(name);
    body.push(0);
    let req = RequestPayload::new(Opcode::Mkdir, body);
    let reply = dispatch::call(session, req)?;
    let entry: wire::FuseEntryOut = wire::parse(&reply)?;
    let nodeid = NodeId(entry.nodeid);
    let attr = match file_attr_from_wire(nodeid, &entry.attr) {
        Ok(a) => a,
        Err(e) => {
            forget_compensate(session, 1);
            return Err(e);
        }
    };
    let node = Arc::new(Node::new(nodeid, parent.nodeid, true, 1));
    node.cache_attr(attr, std::time::Duration::from_secs(entry.attr_valid));
    session.registry.insert(node.clone());
    parent.invalidate_attr();
    session.namecache.purge_negatives(parent.nodeid);
    Ok((node, attr))
}

/// `mknod(parent, name, mode, umask, rdev)` for device/fifo/socket nodes
/// (the regular-file case goes through [`crate::ops::open::create`]'s
/// fallback path instead).
pub fn mknod(
    session: &Session,
    parent: &Node,
    name: &[u8],
    mode: u32,
    rdev: u32,
) -> Result<(Arc<Node>, FileAttr)> {
    preamble(session, parent, "mknod")?;
    check_name_length(name)?;
    reject_embedded_nul(name)?;
    reject_apple_double_create(name)?;
    let mut body = zerocopy::IntoBytes::as_bytes(&FuseMknodIn { mode, rdev }).to_vec();
    body.extend_from_slice(name);
    body.push(0);
    let req = RequestPayload::new(Opcode::Mknod, body);
    let reply = dispatch::call(session, req)?;
    let entry: wire::FuseEntryOut = wire::parse(&reply)?;
    let nodeid = NodeId(entry.nodeid);
    let kind = kind_from_mode(entry.attr.mode)?;
    let attr = file_attr_from_wire(nodeid, &entry.attr)?;
    let node = Arc::new(Node::new(nodeid, parent.nodeid, kind == crate::FileType::Directory, 1));
    node.cache_attr(attr, std::time::Duration::from_secs(entry.attr_valid));
    session.registry.insert(node.clone());
    parent.invalidate_attr();
    session.namecache.purge_negatives(parent.nodeid);
    Ok((node, attr))
}

/// `symlink(parent, link_name, target)`.
pub fn symlink(
    session: &Session,
    parent: &Node,
    link_name: &[u8],
    target: &[u8],
) -> Result<(Arc<Node>, FileAttr)> {
    preamble(session, parent, "symlink")?;
    check_name_length(link_name)?;
    reject_embedded_nul(link_name)?;
    reject_apple_double_create(link_name)?;
    reject_embedded_nul(target)?;
    let mut body = link_name.to_vec();
    body.push(0);
    body.extend_from_slice(target);
    body.push(0);
    let req = RequestPayload::new(Opcode::Symlink, body);
    let reply = dispatch::call(session, req)?;
    let entry: wire::FuseEntryOut = wire::parse(&reply)?;
    let nodeid = NodeId(entry.nodeid);
    let attr = match file_attr_from_wire(nodeid, &entry.attr) {
        Ok(a) => a,
        Err(e) => {
            forget_compensate(session, 1);
            return Err(e);
        }
    };
    let node = Arc::new(Node::new(nodeid, parent.nodeid, false, 1));
    node.cache_attr(attr, std::time::Duration::from_secs(entry.attr_valid));
    session.registry.insert(node.clone());
    parent.invalidate_attr();
    session.namecache.purge_negatives(parent.nodeid);
    Ok((node, attr))
}

/// `readlink(node)`.
pub fn readlink(session: &Session, node: &Node) -> Result<Vec<u8>> {
    preamble(session, node, "readlink")?;
    let req = RequestPayload::new(Opcode::Readlink, Vec::new());
    dispatch::call(session, req)
}

/// `remove(parent, name, node, vnode_busy)`: unlink on a regular file.
/// `remove` on a directory is `EPERM` (callers must route directories
/// through [`rmdir`] instead).
pub fn remove(
    session: &Session,
    parent: &Node,
    name: &[u8],
    node: &Node,
    vnode_busy: bool,
) -> Result<()> {
    preamble(session, parent, "remove")?;
    if node.is_dir() {
        return Err(Error::Errno(Errno::EPERM));
    }
    if vnode_busy {
        return Err(Error::Errno(Errno::EBUSY));
    }
    session.namecache.purge(node.nodeid);
    let mut body = name.to_vec();
    body.push(0);
    let req = RequestPayload::new(Opcode::Unlink, body);
    let result = dispatch::call(session, req);
    session.namecache.purge(node.nodeid);
    result?;
    parent.invalidate_attr();
    Ok(())
}

/// `rmdir(parent, name, node, vnode_busy)`.
pub fn rmdir(
    session: &Session,
    parent: &Node,
    name: &[u8],
    node: &Node,
    vnode_busy: bool,
) -> Result<()> {
    preamble(session, parent, "rmdir")?;
    if vnode_busy {
        return Err(Error::Errno(Errno::EBUSY));
    }
    session.namecache.purge(node.nodeid);
    let mut body = name.to_vec();
    body.push(0);
    let req = RequestPayload::new(Opcode::Rmdir, body);
    let result = dispatch::call(session, req);
    session.namecache.purge(node.nodeid);
    result?;
    parent.invalidate_attr();
    Ok(())
}

/// `link(node, newparent, newname, current_link_count, same_mount)`.
pub fn link(
    session: &Session,
    node: &Node,
    newparent: &Node,
    newname: &[u8],
    current_link_count: u32,
    same_mount: bool,
) -> Result<FileAttr> {
    preamble(session, node, "link")?;
    if !same_mount {
        return Err(Error::Errno(Errno::EXDEV));
    }
    let link_max = libc::c_long::try_from(limits_link_max()).unwrap_or(i64::MAX as libc::c_long) as u32;
    if current_link_count >= link_max {
        return Err(Error::Errno(Errno::EMLINK));
    }

    let mut body = zerocopy::IntoBytes::as_bytes(&FuseLinkIn { oldnodeid: node.nodeid.0 }).to_vec();
    body.extend_from_slice(newname);
    body.push(0);
    let req = RequestPayload::new(Opcode::Link, body);
    let reply = dispatch::call(session, req)?;
    let entry: wire::FuseEntryOut = wire::parse(&reply)?;
    let attr = file_attr_from_wire(node.nodeid, &entry.attr)?;

    node.bump_nlookup(1);
    node.invalidate_attr();
    newparent.invalidate_attr();
    Ok(attr)
}

fn limits_link_max() -> u64 {
    // Host LINK_MAX (§6 pathconf table); a reasonable portable default when
    // the platform exposes no compile-time constant.
    libc::LINK_MAX as u64
}

/// `rename(parent, name, newparent, newname, target)`.
///
/// The source vnode's name-cache entry is purged *before* dispatching
/// `RENAME` (never after), to avoid a stale hit mid-operation (§4.6).
pub fn rename(
    session: &Session,
    parent: &Node,
    name: &[u8],
    newparent: &Node,
    newname: &[u8],
    source_node: &Node,
    target_node: Option<&Node>,
) -> Result<()> {
    preamble(session, parent, "rename")?;
    check_name_length(name)?;
    check_name_length(newname)?;
    reject_embedded_nul(name)?;
    reject_embedded_nul(newname)?;

    session.namecache.purge(source_node.nodeid);

    let mut body = zerocopy::IntoBytes::as_bytes(&FuseRenameIn { newdir: newparent.nodeid.0 }).to_vec();
    body.extend_from_slice(name);
    body.push(0);
    body.extend_from_slice(newname);
    body.push(0);
    let req = RequestPayload::new(Opcode::Rename, body);
    dispatch::call(session, req)?;

    parent.invalidate_attr();
    if newparent.nodeid != parent.nodeid {
        newparent.invalidate_attr();
    }
    if let Some(target) = target_node {
        if target.nodeid != source_node.nodeid {
            session.namecache.purge(target.nodeid);
            if source_node.is_dir() && target.is_dir() {
                session.namecache.purge(newparent.nodeid);
            }
        }
    }
    Ok(())
}

/// `exchange(a, b, same_mount)`: atomically swap two files' contents
/// (macOS/OSXFUSE-only vnop, supplemented from `original_source/`).
pub fn exchange(session: &Session, a: &Node, b: &Node, same_mount: bool) -> Result<()> {
    preamble(session, a, "exchange")?;
    if !same_mount {
        return Err(Error::Errno(Errno::EXDEV));
    }
    let body = zerocopy::IntoBytes::as_bytes(&FuseExchangeIn {
        olddir: a.parent_nodeid.0,
        newdir: b.parent_nodeid.0,
        options: 0,
    })
    .to_vec();
    let req = RequestPayload::new(Opcode::Exchange, body);
    dispatch::not_implemented_means_unsupported(dispatch::call_optional(session, req))?;
    session.namecache.purge(a.nodeid);
    session.namecache.purge(b.nodeid);
    a.invalidate_attr();
    b.invalidate_attr();
    Ok(())
}

/// Compensating `FORGET` helper shared by the create/dir ops (§4.2 undo
/// labels).
pub(crate) fn forget_compensate(session: &Session, n: u64) {
    let body = FuseForgetIn { nlookup: n };
    let req = RequestPayload::new(Opcode::Forget, zerocopy::IntoBytes::as_bytes(&body).to_vec());
    let _ = dispatch::call(session, req);
}
