//! Per-vnode filesystem node (§3 `Node`), file-handle table (C1, §4.2) and
//! attribute cache (C2, §4.3).

use std::sync::Weak;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{Errno, Error, Result};
use crate::flags::{ChangeFlags, NodeFlags};
use crate::open_flags::{OpenAccMode, OpenFlags};
use crate::wire::FUSE_ROOT_ID;
use crate::FileAttr;

/// Daemon-assigned 64-bit node identifier. Stable for the object's
/// daemon-side lifetime; `FUSE_ROOT_ID` is the distinguished root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    pub const ROOT: NodeId = NodeId(FUSE_ROOT_ID);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl From<u64> for NodeId {
    fn from(v: u64) -> Self {
        NodeId(v)
    }
}

/// Which of the three `fufh` slots an open/mmap request selects (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessClass {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessClass {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            AccessClass::ReadOnly => 0,
            AccessClass::WriteOnly => 1,
            AccessClass::ReadWrite => 2,
        }
    }

    /// Class selection from open flags (§4.2): read+write -> RDWR,
    /// write-only -> WRONLY, read-only or the zero value (compat) -> RDONLY.
    pub fn from_open_flags(flags: OpenFlags) -> Self {
        match flags.acc_mode() {
            OpenAccMode::O_RDWR => AccessClass::ReadWrite,
            OpenAccMode::O_WRONLY => AccessClass::WriteOnly,
            OpenAccMode::O_RDONLY => AccessClass::ReadOnly,
        }
    }

    /// Class selection from mmap protection bits (§4.2): `PROT_WRITE`
    /// alone -> WRONLY, `PROT_WRITE` with anything else -> RDWR,
    /// `PROT_READ`/`PROT_EXEC` alone -> RDONLY.
    pub fn from_mmap_prot(prot: i32) -> Self {
        let write = prot & libc::PROT_WRITE != 0;
        let other = prot & !libc::PROT_WRITE != 0;
        match (write, other) {
            (true, true) => AccessClass::ReadWrite,
            (true, false) => AccessClass::WriteOnly,
            _ => AccessClass::ReadOnly,
        }
    }

    /// The one-shot fallback class tried when acquiring this class returns
    /// `EACCES` for a write-capable class (mmap fallback, §4.2).
    pub fn mmap_fallback(self) -> Option<AccessClass> {
        match self {
            AccessClass::WriteOnly | AccessClass::ReadWrite => Some(AccessClass::ReadOnly),
            AccessClass::ReadOnly => None,
        }
    }
}

/// State of one `fufh` slot. Invariant: `open_count == 0 <=> Invalid`.
#[derive(Debug, Clone, Copy, Default)]
enum Slot {
    #[default]
    Invalid,
    Valid {
        id: u64,
        open_count: i32,
        fuse_open_flags: u32,
    },
}

/// The three-element file-handle table (C1), one entry per [`AccessClass`].
#[derive(Debug, Default)]
pub struct FileHandleTable {
    slots: [Slot; AccessClass::COUNT],
}

/// What the caller must do after [`FileHandleTable::get`] succeeds, derived
/// from the daemon's open-reply flags (`DIRECT_IO`/`PURGE_UBC`/`PURGE_ATTR`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOutcome {
    pub fh: u64,
    pub direct_io: bool,
    pub purge_ubc: bool,
    pub purge_attr: bool,
    pub keep_cache: bool,
    pub nonseekable: bool,
}

impl FileHandleTable {
    pub fn is_valid(&self, class: AccessClass) -> bool {
        matches!(self.slots[class.index()], Slot::Valid { .. })
    }

    pub fn fh(&self, class: AccessClass) -> Option<u64> {
        match self.slots[class.index()] {
            Slot::Valid { id, .. } => Some(id),
            Slot::Invalid => None,
        }
    }

    /// Pre-install a handle obtained out-of-band (the `CREATE` fast path,
    /// §4.2): always lands in the `ReadWrite` slot with `open_count == 1`.
    pub fn install_created(&mut self, id: u64, fuse_open_flags: u32) {
        self.slots[AccessClass::ReadWrite.index()] =
            Slot::Valid { id, open_count: 1, fuse_open_flags };
    }

    /// Increment the refcount of an already-valid slot (second+ opener).
    /// Panics if the slot is invalid; callers must check `is_valid` first.
    pub fn inc(&mut self, class: AccessClass) -> i32 {
        match &mut self.slots[class.index()] {
            Slot::Valid { open_count, .. } => {
                *open_count += 1;
                *open_count
            }
            Slot::Invalid => unreachable!("inc on invalid slot"),
        }
    }

    /// Install a freshly opened handle with `open_count = 1`.
    pub fn install_opened(&mut self, class: AccessClass, id: u64, fuse_open_flags: u32) {
        self.slots[class.index()] = Slot::Valid { id, open_count: 1, fuse_open_flags };
    }

    /// Decrement the slot's refcount. Returns `Some(id)` if it reached
    /// zero and the caller must now send `RELEASE`/`RELEASEDIR` for `id`
    /// and mark the slot invalid; `None` if other users remain.
    pub fn dec(&mut self, class: AccessClass) -> Option<u64> {
        let idx = class.index();
        match self.slots[idx] {
            Slot::Valid { id, open_count, .. } if open_count > 1 => {
                self.slots[idx] = Slot::Valid { id, open_count: open_count - 1, fuse_open_flags: 0 };
                None
            }
            Slot::Valid { id, .. } => {
                self.slots[idx] = Slot::Invalid;
                Some(id)
            }
            Slot::Invalid => None,
        }
    }

    /// Unconditionally invalidate a slot regardless of refcount (reclaim
    /// and inactive, §4.6). Returns `Some(id)` if it was valid, so the
    /// caller can still send a single `RELEASE`.
    pub fn reset(&mut self, class: AccessClass) -> Option<u64> {
        let idx = class.index();
        match self.slots[idx] {
            Slot::Valid { id, .. } => {
                self.slots[idx] = Slot::Invalid;
                Some(id)
            }
            Slot::Invalid => None,
        }
    }

    /// All currently valid (class, id) pairs, for reclaim/inactive draining.
    pub fn valid_slots(&self) -> impl Iterator<Item = (AccessClass, u64)> + '_ {
        [AccessClass::ReadOnly, AccessClass::WriteOnly, AccessClass::ReadWrite]
            .into_iter()
            .filter_map(|c| self.fh(c).map(|id| (c, id)))
    }
}

/// A point in time for attribute-cache validity. Sessions convert the
/// daemon's relative timeout into an absolute deadline at load time so
/// `is_fresh` is a cheap monotonic comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn expired() -> Self {
        // An instant that reads as already-elapsed relative to "now" at any
        // later call site; used as the initial state before the first load.
        Deadline(Instant::now() - Duration::from_secs(1))
    }

    pub fn from_ttl(ttl: Duration) -> Self {
        Deadline(Instant::now() + ttl)
    }

    pub fn is_fresh(self) -> bool {
        Instant::now() <= self.0
    }
}

/// Mutable per-node state protected by the node's own lock. Node identity
/// (`nodeid`, `parent_nodeid`) is immutable after construction and read
/// without locking.
#[derive(Debug)]
pub struct NodeState {
    pub nlookup: u64,
    pub filesize: u64,
    pub attr: Option<FileAttr>,
    pub attr_valid: Deadline,
    pub fufh: FileHandleTable,
    pub flags: NodeFlags,
    pub c_flag: ChangeFlags,
}

impl Default for NodeState {
    fn default() -> Self {
        NodeState {
            nlookup: 0,
            filesize: 0,
            attr: None,
            attr_valid: Deadline::expired(),
            fufh: FileHandleTable::default(),
            flags: NodeFlags::empty(),
            c_flag: ChangeFlags::empty(),
        }
    }
}

/// One live vnode's daemon-side identity plus cached state (§3 `Node`).
///
/// `parent` is modeled as a weak handle deliberately (§9 design notes): the
/// parent node may be reclaimed independently of any child holding its id,
/// so `..` resolution must re-verify through the registry rather than trust
/// a strong pointer.
#[derive(Debug)]
pub struct Node {
    pub nodeid: NodeId,
    pub parent_nodeid: NodeId,
    /// Weak back-reference to the parent's own `Node`, for fast-path
    /// attribute reads; always re-validated against the registry before
    /// being trusted (see [`crate::registry::NodeRegistry::resolve_parent`]).
    pub parent: Mutex<Weak<Node>>,
    pub is_dir: std::sync::atomic::AtomicBool,
    state: Mutex<NodeState>,
}

impl Node {
    pub fn new(nodeid: NodeId, parent_nodeid: NodeId, is_dir: bool, nlookup: u64) -> Self {
        Node {
            nodeid,
            parent_nodeid,
            parent: Mutex::new(Weak::new()),
            is_dir: std::sync::atomic::AtomicBool::new(is_dir),
            state: Mutex::new(NodeState { nlookup, ..Default::default() }),
        }
    }

    pub fn state(&self) -> parking_lot::MutexGuard<'_, NodeState> {
        self.state.lock()
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Invariant 6 (§8): mark cached attrs stale. Called on every mutating
    /// op against this node or (where applicable) its parent.
    pub fn invalidate_attr(&self) {
        self.state().attr_valid = Deadline::expired();
    }

    pub fn cached_attr(&self) -> Option<FileAttr> {
        let st = self.state();
        if st.attr_valid.is_fresh() { st.attr } else { None }
    }

    pub fn cache_attr(&self, attr: FileAttr, ttl: Duration) {
        let mut st = self.state();
        st.attr = Some(attr);
        st.attr_valid = Deadline::from_ttl(ttl);
    }

    /// §4.2 `get`: acquire (or reuse) a handle for `class`. `opener` is
    /// called only on a cold slot and must issue `OPEN`/`OPENDIR`.
    pub fn get_handle(
        &self,
        class: AccessClass,
        opener: impl FnOnce() -> Result<OpenOutcome>,
    ) -> Result<u64> {
        {
            let mut st = self.state();
            if st.fufh.is_valid(class) {
                st.fufh.inc(class);
                return Ok(st.fufh.fh(class).expect("just validated"));
            }
        }
        // Opener is a blocking dispatch; must run without the node lock held
        // (§4.5 suspension-point rule).
        let outcome = opener()?;
        let mut st = self.state();
        st.fufh.install_opened(class, outcome.fh, 0);
        Ok(outcome.fh)
    }

    /// §4.2 `put`: drop one reference; if it was the last, returns the id
    /// the caller must `RELEASE`.
    pub fn put_handle(&self, class: AccessClass) -> Option<u64> {
        self.state().fufh.dec(class)
    }

    /// Drain every valid slot unconditionally, for reclaim/inactive. At
    /// most three slots ever exist, so this never spills to the heap.
    pub fn drain_handles(&self) -> SmallVec<[(AccessClass, u64); 3]> {
        let mut st = self.state();
        [AccessClass::ReadOnly, AccessClass::WriteOnly, AccessClass::ReadWrite]
            .into_iter()
            .filter_map(|c| st.fufh.reset(c).map(|id| (c, id)))
            .collect()
    }

    pub fn nlookup(&self) -> u64 {
        self.state().nlookup
    }

    pub fn bump_nlookup(&self, by: u64) {
        self.state().nlookup += by;
    }

    pub fn filesize(&self) -> u64 {
        self.state().filesize
    }

    pub fn set_filesize(&self, size: u64) {
        self.state().filesize = size;
    }
}

/// Convenience for call sites translating a libc errno into this layer's
/// error type without importing `Errno` everywhere.
pub(crate) fn errno(raw: libc::c_int) -> Error {
    Error::Errno(Errno(raw))
}
