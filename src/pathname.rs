//! Name/path helpers (C5, §4.4): length checks, Apple-double and
//! `com.apple.*` xattr filtering, symlink jail prefixing.

use std::path::{Path, PathBuf};

use crate::error::{Errno, Error, Result};
use crate::flags::DataFlags;

/// POSIX `NAME_MAX` this layer enforces (§4.4, §8 boundary: 255 succeeds,
/// 256 fails).
pub const NAME_MAX: usize = 255;

/// §4.4: names longer than 255 bytes are rejected before any dispatch.
pub fn check_name_length(name: &[u8]) -> Result<()> {
    if name.len() > NAME_MAX {
        Err(Error::Errno(Errno::ENAMETOOLONG))
    } else {
        Ok(())
    }
}

/// Names and symlink targets cross the wire NUL-terminated (§4.4); an
/// embedded NUL in the caller's byte string would silently truncate what
/// the daemon sees, so it is rejected here rather than smuggled onto the
/// wire.
pub fn reject_embedded_nul(name: &[u8]) -> Result<()> {
    if memchr::memchr(0, name).is_some() {
        Err(Error::Errno(Errno::EINVAL))
    } else {
        Ok(())
    }
}

/// "Apple-double" shadow file convention (`._foo`): rejected at lookup
/// (`ENOENT`) and create (`EPERM`) per §4.4.
pub fn is_apple_double(name: &[u8]) -> bool {
    name.starts_with(b"._")
}

pub fn reject_apple_double_lookup(name: &[u8]) -> Result<()> {
    if is_apple_double(name) {
        Err(Error::Errno(Errno::ENOENT))
    } else {
        Ok(())
    }
}

pub fn reject_apple_double_create(name: &[u8]) -> Result<()> {
    if is_apple_double(name) {
        Err(Error::Errno(Errno::EPERM))
    } else {
        Ok(())
    }
}

/// §4.4: when `NO_APPLEXATTR` is set, xattr names under the `com.apple.`
/// namespace are rejected with `EPERM` before any dispatch.
pub fn check_xattr_name(name: &[u8], data_flags: DataFlags) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Errno(Errno::EINVAL));
    }
    reject_embedded_nul(name)?;
    if data_flags.contains(DataFlags::NO_APPLEXATTR) && name.starts_with(b"com.apple.") {
        return Err(Error::Errno(Errno::EPERM));
    }
    Ok(())
}

/// §4.4 `readlink`: if the target is absolute and `JAIL_SYMLINKS` is set,
/// prefix the mountpoint before the target bytes so the resolved path
/// stays confined to the mount.
pub fn jail_symlink_target(target: &Path, mountpoint: &Path, data_flags: DataFlags) -> PathBuf {
    if data_flags.contains(DataFlags::JAIL_SYMLINKS) && target.is_absolute() {
        let mut jailed = mountpoint.to_path_buf();
        jailed.push(target.strip_prefix("/").unwrap_or(target));
        jailed
    } else {
        target.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_length_boundary() {
        assert!(check_name_length(&[b'a'; 255]).is_ok());
        assert!(check_name_length(&[b'a'; 256]).is_err());
    }

    #[test]
    fn embedded_nul_rejected() {
        assert!(reject_embedded_nul(b"foo").is_ok());
        assert!(reject_embedded_nul(b"fo\0o").is_err());
    }

    #[test]
    fn apple_double_detection() {
        assert!(is_apple_double(b"._foo"));
        assert!(!is_apple_double(b"foo"));
        assert!(reject_apple_double_lookup(b"._foo").is_err());
        assert!(reject_apple_double_create(b"._foo").is_err());
        assert!(reject_apple_double_lookup(b"foo").is_ok());
    }

    #[test]
    fn apple_xattr_filter() {
        let flags = DataFlags::NO_APPLEXATTR;
        assert!(check_xattr_name(b"com.apple.quarantine", flags).is_err());
        assert!(check_xattr_name(b"user.mime_type", flags).is_ok());
        assert!(check_xattr_name(b"", flags).is_err());
        assert!(check_xattr_name(b"com.apple.quarantine", DataFlags::empty()).is_ok());
    }

    #[test]
    fn symlink_jail_prefixes_absolute_targets() {
        let mnt = Path::new("/mnt/fs");
        let jailed = jail_symlink_target(Path::new("/etc/passwd"), mnt, DataFlags::JAIL_SYMLINKS);
        assert_eq!(jailed, Path::new("/mnt/fs/etc/passwd"));

        let unjailed = jail_symlink_target(Path::new("/etc/passwd"), mnt, DataFlags::empty());
        assert_eq!(unjailed, Path::new("/etc/passwd"));

        let relative = jail_symlink_target(Path::new("../x"), mnt, DataFlags::JAIL_SYMLINKS);
        assert_eq!(relative, Path::new("../x"));
    }
}
