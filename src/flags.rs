//! Session- and node-level boolean contracts (§3).

use bitflags::bitflags;

bitflags! {
    /// Per-session behavior switches, set at mount time and immutable for
    /// the session's lifetime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataFlags: u32 {
        /// Reject xattr names starting with `com.apple.`.
        const NO_APPLEXATTR = 1 << 0;
        /// Host VFS handles xattrs itself; this layer refuses with "not supported".
        const AUTO_XATTR = 1 << 1;
        /// Absolute symlink targets get the mountpoint prefixed on readlink.
        const JAIL_SYMLINKS = 1 << 2;
        /// Bypass the name cache entirely.
        const NO_VNCACHE = 1 << 3;
        /// Suppress the synchronous page flush normally done on close.
        const NO_SYNCONCLOSE = 1 << 4;
        /// Suppress the synchronous write behavior direct I/O would otherwise force.
        const NO_SYNCWRITES = 1 << 5;
    }
}

bitflags! {
    /// Per-node state bits (`N.flags`, §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u32 {
        /// Vnode bypasses the host page cache; reads/writes are explicit round trips.
        const DIRECT_IO = 1 << 0;
    }
}

bitflags! {
    /// Per-node change bits (`N.c_flag`, §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeFlags: u32 {
        /// ctime needs to be bumped on the next attribute load.
        const TOUCH_CHGTIME = 1 << 0;
        /// Cached creation-time/backup-time/change-time fields are valid.
        const XTIMES_VALID = 1 << 1;
    }
}
