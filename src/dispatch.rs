//! Capability map + dispatcher adapter (C3/C4, §4.1).
//!
//! Every call site in [`crate::ops`] that targets an optional opcode goes
//! through [`call_optional`]; mandatory opcodes go through [`call`]. Both
//! funnel into [`crate::transport::dispatch`], so `ENOSYS`/dead-transport
//! handling and the one-way capability clear live in exactly one place.

use log::warn;

use crate::error::{Error, Result};
use crate::opcode::Opcode;
use crate::session::Session;
use crate::transport::{self, RequestPayload};

/// Issue a mandatory request (one whose absence is a protocol error, not a
/// capability gap — §4.1).
pub fn call(session: &Session, req: RequestPayload) -> Result<Vec<u8>> {
    debug_assert!(!req.opcode.is_optional());
    session.without_lock(|| transport::dispatch(session.dispatcher.as_ref(), req))
}

/// Issue an optional request. If the capability bit is already clear,
/// short-circuits to `Err(Error::NotImplemented)` without dispatching. On a
/// live `NotImplemented` reply, clears the bit (one-way, §4.1) before
/// propagating the same error to the caller, which applies its own
/// fallback/`NotSupported` policy (create -> mknod, xattr/ioctl/exchange ->
/// not supported, flush -> ignore).
pub fn call_optional(session: &Session, req: RequestPayload) -> Result<Vec<u8>> {
    debug_assert!(req.opcode.is_optional());
    if !session.cap.has(req.opcode) {
        return Err(Error::NotImplemented);
    }
    let opcode = req.opcode;
    let result = session.without_lock(|| transport::dispatch(session.dispatcher.as_ref(), req));
    if let Err(Error::NotImplemented) = result {
        if session.cap.has(opcode) {
            warn!("daemon answered ENOSYS for {opcode:?}; disabling it for the rest of the session");
        }
        session.cap.clear(opcode);
    }
    result
}

/// §4.1 policy: translate a capability-missing error for ops where the
/// uniform answer is "not supported" (xattr ops, ioctl, exchange) rather
/// than a structural fallback. Non-`NotImplemented` errors pass through
/// unchanged.
pub fn not_implemented_means_unsupported<T>(r: Result<T>) -> Result<T> {
    match r {
        Err(Error::NotImplemented) => Err(Error::NotSupported),
        other => other,
    }
}
