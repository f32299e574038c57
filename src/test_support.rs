//! In-memory fakes for the three out-of-scope boundary traits, used by unit
//! and integration tests in place of a real IPC transport / name cache /
//! page cache (analogous to the teacher's `fuser-tests` harness, §2).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::node::NodeId;
use crate::opcode::Opcode;
use crate::pagecache::{PageCache, PagingOp};
use crate::transport::{Dispatcher, ReplyPayload, RequestPayload, Ticket};

#[derive(Debug, Clone)]
enum Scripted {
    Ok(Vec<u8>),
    Err(libc::c_int),
}

/// Scriptable fake [`Dispatcher`]. Tests enqueue expected replies per
/// opcode with [`FakeDispatcher::reply`]/[`FakeDispatcher::fail_next`] and
/// can assert on [`FakeDispatcher::calls`] afterwards (the basis for §8's
/// "exactly one OPEN/RELEASE" properties).
pub struct FakeDispatcher {
    queued: Mutex<std::collections::HashMap<Opcode, VecDeque<Scripted>>>,
    calls: Mutex<Vec<Opcode>>,
    next_ticket: AtomicU64,
    connected: std::sync::atomic::AtomicBool,
}

impl FakeDispatcher {
    /// A fresh fake with no scripted replies and the transport marked connected.
    pub fn new() -> Self {
        FakeDispatcher {
            queued: Mutex::new(std::collections::HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_ticket: AtomicU64::new(1),
            connected: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Queue a successful reply for the next call to `op`.
    pub fn reply(&self, op: Opcode, bytes: Vec<u8>) {
        self.queued.lock().unwrap().entry(op).or_default().push_back(Scripted::Ok(bytes));
    }

    /// Queue an error reply (given errno) for the next call to `op`.
    pub fn fail_next(&self, op: Opcode, errno: libc::c_int) {
        self.queued.lock().unwrap().entry(op).or_default().push_back(Scripted::Err(errno));
    }

    /// Every opcode dispatched so far, in order.
    pub fn calls(&self) -> Vec<Opcode> {
        self.calls.lock().unwrap().clone()
    }

    /// How many times `op` has been dispatched so far.
    pub fn call_count(&self, op: Opcode) -> usize {
        self.calls().into_iter().filter(|o| *o == op).count()
    }

    /// Mark the fake transport dead; subsequent `is_connected()` calls
    /// return `false` without touching any scripted reply.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl Default for FakeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for FakeDispatcher {
    fn prepare(&self, _req: &RequestPayload) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    fn send_wait(&self, _ticket: &Ticket, req: &RequestPayload) -> ReplyPayload {
        self.calls.lock().unwrap().push(req.opcode);
        let mut guard = self.queued.lock().unwrap();
        match guard.get_mut(&req.opcode).and_then(VecDeque::pop_front) {
            Some(Scripted::Ok(bytes)) => ReplyPayload::Ok(bytes),
            Some(Scripted::Err(errno)) => ReplyPayload::Err(errno),
            None => ReplyPayload::Ok(Vec::new()),
        }
    }

    fn drop_ticket(&self, _ticket: Ticket) {}

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// No-op fake [`PageCache`]; tests that exercise direct-I/O paths never
/// touch it, and tests that exercise the page-cache delegation paths only
/// assert call counts are irrelevant to this layer's own invariants.
#[derive(Default)]
pub struct FakePageCache;

impl PageCache for FakePageCache {
    fn cluster_read(&self, _node: NodeId, _offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }

    fn cluster_write(&self, _node: NodeId, _offset: u64, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }

    fn msync(&self, _node: NodeId) -> std::io::Result<()> {
        Ok(())
    }

    fn invalidate(&self, _node: NodeId) {}

    fn setsize(&self, _node: NodeId, _size: u64) {}

    fn set_readahead(&self, _node: NodeId, _enabled: bool) {}

    fn page_transfer(
        &self,
        _node: NodeId,
        _op: PagingOp,
        _offset: u64,
        len: usize,
        _blocksize: u32,
    ) -> std::io::Result<usize> {
        Ok(len)
    }
}
