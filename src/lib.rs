//! Vnode operations layer: translates VFS-shaped calls (lookup, open,
//! read/write, attribute get/set, directory and name-space edits, xattr,
//! paging) into the userspace-filesystem wire protocol, and owns the
//! per-mount bookkeeping (node registry, file-handle table, attribute
//! cache, capability map, name-cache coordination) that the kernel glue
//! linking this crate in does not have to reimplement itself.
//!
//! The daemon IPC transport, the host page cache, the host name cache and
//! host-side authorization are all out of scope (see [`transport`],
//! [`pagecache`], [`namecache`], [`authz`]): this crate consumes those as
//! traits and is exercised against in-memory fakes in its own test suite
//! (see [`test_support`]).

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

use std::os::unix::fs::FileTypeExt;
use std::time::SystemTime;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

pub use crate::access_flags::AccessFlags;
pub use crate::bsd_file_flags::BsdFileFlags;
pub use crate::cap::CapabilityMap;
pub use crate::error::{Errno, Error, Result};
pub use crate::flags::{ChangeFlags, DataFlags, NodeFlags};
pub use crate::node::{AccessClass, Node, NodeId};
pub use crate::opcode::Opcode;
pub use crate::open_flags::{OpenAccMode, OpenFlags};
pub use crate::session::{Session, SessionConfig};

mod access_flags;
pub mod attr;
pub mod authz;
mod bsd_file_flags;
mod cap;
pub mod dispatch;
pub mod error;
mod flags;
mod ll;
pub mod namecache;
pub mod node;
mod opcode;
mod open_flags;
pub mod ops;
pub mod pagecache;
mod pathname;
pub mod registry;
pub mod session;
/// In-memory fakes for [`transport::Dispatcher`]/[`pagecache::PageCache`].
/// Built for this crate's own unit tests; also exposed under `test-util`
/// so the `tests/` integration suite (a separate crate) can exercise the
/// public `ops::*` entry points against the same fakes, analogous to the
/// teacher's own test-harness split.
#[cfg(any(test, feature = "test-util"))]
pub mod test_support;
mod time;
pub mod transport;
pub mod wire;

/// Kind of filesystem object a node names, mirroring `S_IFMT` (§4.3).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum FileType {
    /// Named pipe (`S_IFIFO`)
    NamedPipe,
    /// Character device (`S_IFCHR`)
    CharDevice,
    /// Block device (`S_IFBLK`)
    BlockDevice,
    /// Directory (`S_IFDIR`)
    Directory,
    /// Regular file (`S_IFREG`)
    RegularFile,
    /// Symbolic link (`S_IFLNK`)
    Symlink,
    /// Unix domain socket (`S_IFSOCK`)
    Socket,
}

impl FileType {
    /// Convert a std `FileType` to this crate's [`FileType`], as used when
    /// the host VFS glue needs to classify a local path rather than a wire
    /// reply (e.g. constructing a fabricated root attribute).
    pub fn from_std(file_type: std::fs::FileType) -> Option<Self> {
        if file_type.is_file() {
            Some(FileType::RegularFile)
        } else if file_type.is_dir() {
            Some(FileType::Directory)
        } else if file_type.is_symlink() {
            Some(FileType::Symlink)
        } else if file_type.is_fifo() {
            Some(FileType::NamedPipe)
        } else if file_type.is_socket() {
            Some(FileType::Socket)
        } else if file_type.is_char_device() {
            Some(FileType::CharDevice)
        } else if file_type.is_block_device() {
            Some(FileType::BlockDevice)
        } else {
            None
        }
    }
}

/// Host-visible file attributes (§3 `FileAttr`), decoded from the wire
/// `fuse_attr` shape by the [`attr`] module.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct FileAttr {
    /// Node identifier this attribute set describes.
    pub ino: NodeId,
    /// Size in bytes.
    pub size: u64,
    /// Allocated size in 512-byte blocks. May be smaller than `size` for a
    /// sparse or compressed file.
    pub blocks: u64,
    /// Time of last access.
    pub atime: SystemTime,
    /// Time of last modification.
    pub mtime: SystemTime,
    /// Time of last change.
    pub ctime: SystemTime,
    /// Time of creation (macOS only).
    pub crtime: SystemTime,
    /// Kind of file (directory, regular file, pipe, etc).
    pub kind: FileType,
    /// Permission bits.
    pub perm: u16,
    /// Number of hard links.
    pub nlink: u32,
    /// User id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
    /// Device number, for device nodes.
    pub rdev: u32,
    /// Preferred I/O block size.
    pub blksize: u32,
    /// BSD file flags (macOS only, see `chflags(2)`).
    pub flags: u32,
}
