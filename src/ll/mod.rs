//! Low-level bitflag payloads shared across wire structs.
//!
//! Everything here is a pure value type with no dispatch behavior; the
//! structs that carry these flags live in [`crate::wire`].

pub(crate) mod flags;
