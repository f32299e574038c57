//! `read`/`write` (§4.6).

use crate::dispatch;
use crate::error::{Errno, Error, Result};
use crate::flags::NodeFlags;
use crate::ll::flags::read_flags::ReadFlags;
use crate::ll::flags::write_flags::WriteFlags;
use crate::node::{AccessClass, Node};
use crate::opcode::Opcode;
use crate::ops::preamble;
use crate::session::Session;
use crate::transport::RequestPayload;
use crate::wire::{self, FuseReadIn, FuseWriteIn, FuseWriteOut};
use crate::FileType;

/// `read(node, kind, offset, buf)`. `VDIR` via `read` is `EISDIR`;
/// non-regular is `EPERM`; negative offset (represented by the caller
/// passing a negative value before converting to `u64`) must be rejected
/// by the caller before it ever reaches here — see `EINVAL` boundary note.
pub fn read(session: &Session, node: &Node, kind: FileType, offset: i64, buf: &mut [u8]) -> Result<usize> {
    preamble(session, node, "read")?;
    if kind == FileType::Directory {
        return Err(Error::Errno(Errno::EISDIR));
    }
    if kind != FileType::RegularFile {
        return Err(Error::Errno(Errno::EPERM));
    }
    if offset < 0 {
        return Err(Error::Errno(Errno::EINVAL));
    }
    if buf.is_empty() {
        return Ok(0);
    }

    if node.state().flags.contains(NodeFlags::DIRECT_IO) {
        direct_read(session, node, offset as u64, buf)
    } else {
        session
            .pagecache
            .cluster_read(node.nodeid, offset as u64, buf)
            .map_err(|e| Error::Errno(Errno(e.raw_os_error().unwrap_or(libc::EIO))))
    }
}

fn direct_io_slot(node: &Node, preferred: AccessClass) -> Result<u64> {
    let st = node.state();
    if let Some(fh) = st.fufh.fh(preferred) {
        return Ok(fh);
    }
    st.fufh.fh(AccessClass::ReadWrite).ok_or(Error::Errno(Errno::EBADF))
}

fn direct_read(session: &Session, node: &Node, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let fh = direct_io_slot(node, AccessClass::ReadOnly)?;
    let iosize = session.config.iosize as usize;
    let mut total = 0usize;
    while total < buf.len() {
        let chunk_len = iosize.min(buf.len() - total);
        let body = FuseReadIn {
            fh,
            offset: offset + total as u64,
            size: chunk_len as u32,
            read_flags: ReadFlags::empty().bits(),
            lock_owner: 0,
            flags: 0,
            padding: 0,
        };
        let req = RequestPayload::new(Opcode::Read, zerocopy::IntoBytes::as_bytes(&body).to_vec());
        let reply = dispatch::call(session, req)?;
        let n = reply.len().min(chunk_len);
        buf[total..total + n].copy_from_slice(&reply[..n]);
        total += n;
        if n < chunk_len {
            // Short reply terminates the loop (§4.6 scenario 3).
            break;
        }
    }
    Ok(total)
}

/// `write(node, kind, offset, data, extend_filesize)`.
///
/// `extend_filesize` is called (with the new size) *before* the cluster
/// call on the non-direct-I/O path, and rolled back to the previous value
/// if the cluster call errors, so the page cache observes the new size at
/// the moment it needs to (§4.6). On the direct-I/O path the daemon's
/// reply size is authoritative and no separate `extend_filesize` hook is
/// needed before dispatch.
pub fn write(
    session: &Session,
    node: &Node,
    kind: FileType,
    offset: i64,
    data: &[u8],
) -> Result<usize> {
    preamble(session, node, "write")?;
    if kind == FileType::Directory {
        return Err(Error::Errno(Errno::EISDIR));
    }
    if kind != FileType::RegularFile {
        return Err(Error::Errno(Errno::EPERM));
    }
    if offset < 0 {
        return Err(Error::Errno(Errno::EINVAL));
    }

    if node.state().flags.contains(NodeFlags::DIRECT_IO) {
        direct_write(session, node, offset as u64, data)
    } else {
        let prior_size = node.filesize();
        let new_end = offset as u64 + data.len() as u64;
        if new_end > prior_size {
            node.set_filesize(new_end);
            session.pagecache.setsize(node.nodeid, new_end);
        }
        match session.pagecache.cluster_write(node.nodeid, offset as u64, data) {
            Ok(n) => Ok(n),
            Err(e) => {
                if new_end > prior_size {
                    node.set_filesize(prior_size);
                    session.pagecache.setsize(node.nodeid, prior_size);
                }
                Err(Error::Errno(Errno(e.raw_os_error().unwrap_or(libc::EIO))))
            }
        }
    }
}

fn direct_write(session: &Session, node: &Node, offset: u64, data: &[u8]) -> Result<usize> {
    let fh = {
        let st = node.state();
        st.fufh.fh(AccessClass::WriteOnly).or_else(|| st.fufh.fh(AccessClass::ReadWrite))
    }
    .ok_or(Error::Errno(Errno::EBADF))?;

    let iosize = session.config.iosize as usize;
    let mut total = 0usize;
    while total < data.len() {
        let chunk = &data[total..(total + iosize).min(data.len())];
        let body = FuseWriteIn {
            fh,
            offset: offset + total as u64,
            size: chunk.len() as u32,
            write_flags: WriteFlags::empty().bits(),
            lock_owner: 0,
            flags: 0,
            padding: 0,
        };
        let mut req_body = zerocopy::IntoBytes::as_bytes(&body).to_vec();
        req_body.extend_from_slice(chunk);
        let req = RequestPayload::new(Opcode::Write, req_body);
        let reply = dispatch::call(session, req)?;
        let out: FuseWriteOut = wire::parse(&reply)?;
        if out.size as usize != chunk.len() {
            return Err(Error::Protocol("short WRITE reply"));
        }
        total += chunk.len();
    }
    let new_end = offset + total as u64;
    if new_end > node.filesize() {
        node.set_filesize(new_end);
    }
    Ok(total)
}
