//! The protocol opcode set this layer can dispatch, and the subset that is
//! merely optional (capability-gated — see [`crate::cap::CapabilityMap`]).

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// One request type in the wire protocol (§6). `EXCHANGE` is OSXFUSE-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Opcode {
    Lookup = 1,
    Forget = 2,
    Getattr = 3,
    Setattr = 4,
    Readlink = 5,
    Symlink = 6,
    Mknod = 8,
    Mkdir = 9,
    Unlink = 10,
    Rmdir = 11,
    Rename = 12,
    Link = 13,
    Open = 14,
    Read = 15,
    Write = 16,
    Statfs = 17,
    Release = 18,
    Fsync = 20,
    Setxattr = 21,
    Getxattr = 22,
    Listxattr = 23,
    Removexattr = 24,
    Flush = 25,
    Init = 26,
    Opendir = 27,
    Readdir = 28,
    Releasedir = 29,
    Fsyncdir = 30,
    Getlk = 31,
    Setlk = 32,
    Setlkw = 33,
    Access = 34,
    Create = 35,
    Interrupt = 36,
    Bmap = 37,
    Destroy = 38,
    Ioctl = 39,
    Poll = 40,
    BatchForget = 42,
    Exchange = 63,
}

impl Opcode {
    /// Operations the daemon may legitimately decline with `ENOSYS`; every
    /// other opcode is assumed mandatory (its absence is a protocol error,
    /// not a capability gap).
    pub const fn is_optional(self) -> bool {
        matches!(
            self,
            Opcode::Create
                | Opcode::Setxattr
                | Opcode::Getxattr
                | Opcode::Listxattr
                | Opcode::Removexattr
                | Opcode::Flush
                | Opcode::Ioctl
                | Opcode::Exchange
                | Opcode::Bmap
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_set_matches_spec_capability_gated_ops() {
        assert!(Opcode::Create.is_optional());
        assert!(Opcode::Ioctl.is_optional());
        assert!(Opcode::Exchange.is_optional());
        assert!(!Opcode::Lookup.is_optional());
        assert!(!Opcode::Getattr.is_optional());
    }
}
