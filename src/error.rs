//! Unified error type for the vnode operations layer (§7, §9 Design Notes).
//!
//! Every op in [`crate::ops`] returns `Result<T, Error>`; the dispatch-table
//! boundary (out of scope here — owned by the kernel glue that links this
//! crate in) is the only place that needs to flatten this back to a raw
//! errno.

use std::fmt;

/// A POSIX errno, narrowed to the values this layer's taxonomy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(pub libc::c_int);

/// BSD kernel pseudo-errno meaning "caller should proceed with its own
/// create/rename logic". Not part of libc's portable errno set, and never
/// crosses the transport boundary, so it's defined locally.
const EJUSTRETURN: libc::c_int = -2;

impl Errno {
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const EPERM: Errno = Errno(libc::EPERM);
    pub const EIO: Errno = Errno(libc::EIO);
    pub const ENXIO: Errno = Errno(libc::ENXIO);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const EXDEV: Errno = Errno(libc::EXDEV);
    pub const ENOTDIR: Errno = Errno(libc::ENOTDIR);
    pub const EISDIR: Errno = Errno(libc::EISDIR);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const EBUSY: Errno = Errno(libc::EBUSY);
    pub const EMLINK: Errno = Errno(libc::EMLINK);
    pub const ENAMETOOLONG: Errno = Errno(libc::ENAMETOOLONG);
    pub const EROFS: Errno = Errno(libc::EROFS);
    pub const ERANGE: Errno = Errno(libc::ERANGE);
    pub const E2BIG: Errno = Errno(libc::E2BIG);
    pub const EFBIG: Errno = Errno(libc::EFBIG);
    pub const EAGAIN: Errno = Errno(libc::EAGAIN);
    pub const ENOTCONN: Errno = Errno(libc::ENOTCONN);
    pub const ENOSYS: Errno = Errno(libc::ENOSYS);
    pub const ENOTSUP: Errno = Errno(libc::ENOTSUP);
    pub const EBADF: Errno = Errno(libc::EBADF);
    pub const EACCES: Errno = Errno(libc::EACCES);

    pub const fn raw(self) -> libc::c_int {
        self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY-free: strerror is not async-signal-safe but we aren't in a
        // signal handler; fall back to the bare number if it ever returns null.
        write!(f, "errno {}", self.0)
    }
}

/// Taxonomy of §7: dead/disconnected, capability-missing, protocol sanity,
/// ordinary domain errors, all folded into one type so `ops::*` signatures
/// stay uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Session is dead (`ENXIO`) or the daemon end is gone (`ENOTCONN`).
    /// Which raw errno a caller sees depends on call-site context (root
    /// vnode attribute paths fabricate instead of propagating `ENOTCONN`).
    Dead { disconnected: bool },
    /// The daemon replied `ENOSYS` for an optional op; the capability bit
    /// has already been cleared by the time this reaches a caller. Never
    /// surfaced to the VFS as `ENOSYS` — always translated at the op
    /// boundary into `NotSupported` or a fallback path.
    NotImplemented,
    /// The daemon implements the op but declines it (capability present,
    /// but this particular call is refused, e.g. `AUTO_XATTR`).
    NotSupported,
    /// A reply violated a wire invariant (zero mode, disallowed nodeid, …).
    Protocol(&'static str),
    /// An ordinary domain errno, propagated verbatim.
    Errno(Errno),
    /// `EJUSTRETURN` sentinel from `lookup` on a create/rename last
    /// component miss — not a real errno, never surfaced past `ops::lookup`.
    JustReturn,
}

impl Error {
    /// Flatten to a raw errno at the VFS boundary. `NotImplemented` must
    /// never reach here in practice — every call site that can observe it
    /// is required to translate it first (see §4.1).
    pub fn to_errno(self) -> libc::c_int {
        match self {
            Error::Dead { disconnected: true } => libc::ENOTCONN,
            Error::Dead { disconnected: false } => libc::ENXIO,
            Error::NotImplemented => libc::ENOSYS,
            Error::NotSupported => libc::ENOTSUP,
            Error::Protocol(_) => libc::EIO,
            Error::Errno(e) => e.0,
            Error::JustReturn => EJUSTRETURN,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Dead { disconnected } => write!(f, "session dead (disconnected={disconnected})"),
            Error::NotImplemented => write!(f, "daemon does not implement operation"),
            Error::NotSupported => write!(f, "operation not supported"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Errno(e) => fmt::Display::fmt(e, f),
            Error::JustReturn => write!(f, "EJUSTRETURN"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Errno> for Error {
    fn from(e: Errno) -> Self {
        Error::Errno(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
