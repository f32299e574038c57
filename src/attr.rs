//! Conversions between the wire `fuse_attr` shape and this crate's
//! host-visible [`crate::FileAttr`]/[`crate::FileType`], grounded in the
//! teacher's `ll::reply::{mode_from_kind_and_perm, fuse_attr_from_attr}`.

use crate::error::{Errno, Error, Result};
use crate::node::NodeId;
use crate::time::system_time_from_time;
use crate::wire::FuseAttr;
use crate::{FileAttr, FileType};

#[allow(clippy::unnecessary_cast)]
pub(crate) fn mode_from_kind_and_perm(kind: FileType, perm: u16) -> u32 {
    (match kind {
        FileType::NamedPipe => libc::S_IFIFO,
        FileType::CharDevice => libc::S_IFCHR,
        FileType::BlockDevice => libc::S_IFBLK,
        FileType::Directory => libc::S_IFDIR,
        FileType::RegularFile => libc::S_IFREG,
        FileType::Symlink => libc::S_IFLNK,
        FileType::Socket => libc::S_IFSOCK,
    }) as u32
        | u32::from(perm)
}

/// §4.3/§4.6 protocol sanity check: `mode & S_IFMT == 0` is a reply
/// violating a wire invariant, surfaced as `EIO`.
pub(crate) fn kind_from_mode(mode: u32) -> Result<FileType> {
    match mode & libc::S_IFMT as u32 {
        m if m == libc::S_IFIFO as u32 => Ok(FileType::NamedPipe),
        m if m == libc::S_IFCHR as u32 => Ok(FileType::CharDevice),
        m if m == libc::S_IFBLK as u32 => Ok(FileType::BlockDevice),
        m if m == libc::S_IFDIR as u32 => Ok(FileType::Directory),
        m if m == libc::S_IFREG as u32 => Ok(FileType::RegularFile),
        m if m == libc::S_IFLNK as u32 => Ok(FileType::Symlink),
        m if m == libc::S_IFSOCK as u32 => Ok(FileType::Socket),
        0 => Err(Error::Protocol("zero mode in reply")),
        _ => Err(Error::Protocol("unrecognized file type bits")),
    }
}

pub(crate) fn file_attr_from_wire(ino: NodeId, wire: &FuseAttr) -> Result<FileAttr> {
    let kind = kind_from_mode(wire.mode)?;
    Ok(FileAttr {
        ino,
        size: wire.size,
        blocks: wire.blocks,
        atime: system_time_from_time(wire.atime, wire.atimensec),
        mtime: system_time_from_time(wire.mtime, wire.mtimensec),
        ctime: system_time_from_time(wire.ctime, wire.ctimensec),
        crtime: system_time_from_time(wire.crtime as i64, wire.crtimensec),
        kind,
        perm: (wire.mode & 0o7777) as u16,
        nlink: wire.nlink,
        uid: wire.uid,
        gid: wire.gid,
        rdev: wire.rdev,
        blksize: wire.blksize,
        flags: wire.flags,
    })
}

pub(crate) fn root_fallback_attr(uid: u32, gid: u32) -> FileAttr {
    // §4.6 getattr on a disconnected root: fabricate S_IRWXU owned by the
    // daemon's credentials rather than propagating ENOTCONN.
    FileAttr {
        ino: NodeId::ROOT,
        size: 0,
        blocks: 0,
        atime: std::time::SystemTime::UNIX_EPOCH,
        mtime: std::time::SystemTime::UNIX_EPOCH,
        ctime: std::time::SystemTime::UNIX_EPOCH,
        crtime: std::time::SystemTime::UNIX_EPOCH,
        kind: FileType::Directory,
        perm: libc::S_IRWXU as u16,
        nlink: 2,
        uid,
        gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

pub(crate) fn errno_result<T>(raw: libc::c_int) -> Result<T> {
    Err(Error::Errno(Errno(raw)))
}
