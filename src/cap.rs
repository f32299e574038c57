//! Per-session capability bitmap (C4, §3, §4.1).
//!
//! Bit set ⇒ "daemon implements this opcode". Initialized all-set;
//! cleared one-way on the first `ENOSYS` reply for that opcode. A session
//! restart is the only way to revive a bit, and restart is out of scope
//! here, so there is no way back once a bit is cleared.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::opcode::Opcode;

/// Lock-free bitmap over the wire opcode set.
///
/// Only [`Opcode::is_optional`] opcodes are ever queried or cleared;
/// mandatory opcodes are always reported present. The bitmap itself does
/// not enforce that distinction — callers in [`crate::ops`] only call
/// [`CapabilityMap::has`]/[`CapabilityMap::clear`] for optional opcodes.
#[derive(Debug)]
pub struct CapabilityMap {
    bits: AtomicU64,
}

impl CapabilityMap {
    /// All capability bits set, matching the "daemon implements
    /// everything until proven otherwise" initial state.
    pub fn new() -> Self {
        CapabilityMap { bits: AtomicU64::new(u64::MAX) }
    }

    fn mask(op: Opcode) -> u64 {
        let idx: u32 = op.into();
        debug_assert!(idx < 64, "opcode {idx} does not fit the capability bitmap");
        1u64 << (idx % 64)
    }

    /// Lock-free read: `true` unless this opcode has been cleared.
    pub fn has(&self, op: Opcode) -> bool {
        self.bits.load(Ordering::Acquire) & Self::mask(op) != 0
    }

    /// Atomic-AND clear. Idempotent; clearing an already-cleared bit is a
    /// no-op observable the same way from every thread.
    pub fn clear(&self, op: Opcode) {
        self.bits.fetch_and(!Self::mask(op), Ordering::AcqRel);
    }
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self::new()
    }
}
