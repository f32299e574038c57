//! Boundary to the IPC layer (out of scope, §1): `init/make/wait_answer/drop`.
//!
//! This crate never frames bytes or owns a socket/device fd itself; it
//! depends only on the [`Dispatcher`] trait so the vnode op layer can be
//! exercised against an in-memory fake in tests (see `tests/`) and linked
//! against a real ticket dispatcher in the kernel glue that embeds it.

use crate::error::{Errno, Error, Result};
use crate::opcode::Opcode;

/// One in-flight request/reply exchange.
///
/// A ticket must be dropped exactly once on every path: the success path
/// drops it after the reply payload has been read out by the caller; an
/// error path must still drop it unless the dispatcher itself absorbed it
/// (see [`Dispatcher::drop_ticket`]).
#[derive(Debug)]
pub struct Ticket(pub u64);

/// A request to issue to the daemon: an opcode, the node it targets (for
/// logging/capability bookkeeping only — the payload carries whatever
/// nodeid the wire format actually needs), and the serialized body.
#[derive(Debug, Clone)]
pub struct RequestPayload {
    pub opcode: Opcode,
    pub body: Vec<u8>,
    /// Marks the request interruptible by a signal on the calling thread
    /// (§4.6 xattr ops: oversized payloads). Most requests are not.
    pub killable: bool,
}

impl RequestPayload {
    pub fn new(opcode: Opcode, body: Vec<u8>) -> Self {
        RequestPayload { opcode, body, killable: false }
    }

    pub fn killable(mut self) -> Self {
        self.killable = true;
        self
    }
}

/// The daemon's answer: either a success payload or a raw errno.
#[derive(Debug, Clone)]
pub enum ReplyPayload {
    Ok(Vec<u8>),
    Err(libc::c_int),
}

/// The IPC layer this crate is built against. Implemented by the out-of-scope
/// ticket dispatcher in real deployments, and by an in-memory fake in tests.
///
/// Implementations must be safe to call with no locks held by the caller —
/// [`Dispatcher::send_wait`] is the canonical "suspension point" of §4.5 and
/// must never be called while the session lock is held.
pub trait Dispatcher: Send + Sync {
    /// Allocate a ticket and hand back a handle for the in-flight exchange.
    /// Must not block.
    fn prepare(&self, req: &RequestPayload) -> Ticket;

    /// Block until the daemon answers (or the transport dies). Must be
    /// called with no session lock held.
    fn send_wait(&self, ticket: &Ticket, req: &RequestPayload) -> ReplyPayload;

    /// Release a ticket that was not already consumed by `send_wait`
    /// returning a terminal transport error. Idempotent.
    fn drop_ticket(&self, ticket: Ticket);

    /// `true` once the transport is known dead (peer gone, `/dev/fuse`
    /// closed, …). Mirrors `session.dead`, but the transport is the source
    /// of truth for "disconnected" vs. the session's own "dead" latch.
    fn is_connected(&self) -> bool;
}

/// Issue one request and return its raw reply bytes, translating
/// transport-level failure uniformly (§4.1).
///
/// This is the C3 "request dispatcher adapter": every call site in
/// [`crate::ops`] goes through here rather than touching a [`Dispatcher`]
/// directly, so `ENOSYS`/dead-transport handling lives in exactly one place.
pub fn dispatch(dispatcher: &dyn Dispatcher, req: RequestPayload) -> Result<Vec<u8>> {
    if !dispatcher.is_connected() {
        return Err(Error::Dead { disconnected: true });
    }
    let ticket = dispatcher.prepare(&req);
    match dispatcher.send_wait(&ticket, &req) {
        ReplyPayload::Ok(bytes) => Ok(bytes),
        ReplyPayload::Err(libc::ENOSYS) => Err(Error::NotImplemented),
        ReplyPayload::Err(libc::ENOTCONN) => Err(Error::Dead { disconnected: true }),
        ReplyPayload::Err(errno) => Err(Error::Errno(Errno(errno))),
    }
}
