//! Session (§3 `Session`) and the concurrency wrapper around it (C7, §4.5).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::error;
use parking_lot::Mutex;

use crate::authz::{Authorizer, NullAuthorizer};
use crate::cap::CapabilityMap;
use crate::namecache::NameCache;
use crate::node::{Node, NodeId};
use crate::pagecache::PageCache;
use crate::registry::NodeRegistry;
use crate::transport::Dispatcher;
use crate::DataFlags;

/// Construction-time parameters for a [`Session`], analogous to the
/// teacher's `KernelConfig`/`MountOption` handling but scoped to what this
/// layer needs: mount-option string parsing and the init handshake are
/// out of scope (§1).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mountpoint: PathBuf,
    pub blocksize: u32,
    pub iosize: u32,
    pub userspace_buffer_size: u32,
    pub data_flags: DataFlags,
    pub daemon_uid: u32,
    pub daemon_gid: u32,
}

impl SessionConfig {
    pub fn new(mountpoint: impl Into<PathBuf>) -> Self {
        SessionConfig {
            mountpoint: mountpoint.into(),
            blocksize: 4096,
            iosize: 4096,
            userspace_buffer_size: 16 * 1024 * 1024,
            data_flags: DataFlags::empty(),
            daemon_uid: 0,
            daemon_gid: 0,
        }
    }
}

/// One session per mount (§3). Owns everything a vnode op needs besides the
/// node itself: the transport, the three consumed-trait boundaries
/// (dispatcher/name cache/page cache), the capability map (C4), the node
/// registry (C8), and the session-wide lock (C7).
///
/// The "coarse session lock" of §9 is modeled here as `parking_lot::Mutex`
/// guarding nothing by itself — state mutation lives in [`Node`]'s own
/// lock and the registry's own lock (§5's finer-grained option, explicitly
/// permitted by the design notes as long as the suspension-point rule
/// holds). `SessionLock` instead exists to make "no blocking call may be
/// made while holding any lock that could deadlock the daemon reader
/// thread" a single named discipline call sites opt into, rather than an
/// unenforced convention.
pub struct Session {
    pub config: SessionConfig,
    pub cap: CapabilityMap,
    pub registry: NodeRegistry,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub namecache: Arc<dyn NameCache>,
    pub pagecache: Arc<dyn PageCache>,
    pub authorizer: Arc<dyn Authorizer>,
    dead: AtomicBool,
    inited: AtomicBool,
    /// Placeholder for future per-session mutable fields that do need a
    /// single coarse lock (mirrors the teacher's "biglock" default, §9).
    misc: Mutex<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("dead", &self.is_dead())
            .field("inited", &self.inited.load(Ordering::Relaxed))
            .field("nodes", &self.registry.len())
            .finish()
    }
}

impl Session {
    pub fn new(
        config: SessionConfig,
        dispatcher: Arc<dyn Dispatcher>,
        namecache: Arc<dyn NameCache>,
        pagecache: Arc<dyn PageCache>,
    ) -> Arc<Self> {
        Arc::new(Session {
            config,
            cap: CapabilityMap::new(),
            registry: NodeRegistry::new(),
            dispatcher,
            namecache,
            pagecache,
            authorizer: Arc::new(NullAuthorizer),
            dead: AtomicBool::new(false),
            inited: AtomicBool::new(false),
            misc: Mutex::new(()),
        })
    }

    /// Override the default [`NullAuthorizer`] before the session is shared.
    pub fn with_authorizer(mut self: Arc<Self>, authorizer: Arc<dyn Authorizer>) -> Arc<Self> {
        match Arc::get_mut(&mut self) {
            Some(s) => s.authorizer = authorizer,
            None => unreachable!("with_authorizer must be called before the session is shared"),
        }
        self
    }

    /// `session.dead` is observable lock-free (§5): a thread can check this
    /// before deciding whether it even needs to touch the registry.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire) || !self.dispatcher.is_connected()
    }

    pub fn mark_dead(&self) {
        if !self.dead.swap(true, Ordering::Release) {
            error!("session marked dead; future vnode ops short-circuit without dispatching");
        }
    }

    pub fn is_inited(&self) -> bool {
        self.inited.load(Ordering::Acquire)
    }

    pub fn mark_inited(&self) {
        self.inited.store(true, Ordering::Release);
    }

    pub fn name_cache_enabled(&self) -> bool {
        !self.config.data_flags.contains(DataFlags::NO_VNCACHE)
    }

    /// Run `f` while holding the coarse session critical section. `f` must
    /// not perform a blocking call (§4.5); use [`Session::without_lock`]
    /// around any dispatcher/page-cache/name-cache call instead.
    pub fn with_locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.misc.lock();
        f()
    }

    /// Documents (and, if the session ever grows a real coarse lock again,
    /// enforces) that the enclosed block is a suspension point: no session
    /// lock may be held while it runs. Currently a no-op wrapper since
    /// per-node/per-registry locking replaced the single biglock, but
    /// callers still route every blocking call through here so the
    /// discipline of §4.5 stays visible at each call site.
    pub fn without_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }

    /// Resolve a node or, for the root after the transport has died,
    /// succeed anyway — callers needing the "fabricate root attrs on
    /// `ENOTCONN`" behavior of §4.6 check `is_dead()` themselves first.
    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.registry.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namecache::NullNameCache;
    use crate::test_support::{FakeDispatcher, FakePageCache};

    #[test]
    fn dead_is_observable_without_explicit_lock() {
        let session = Session::new(
            SessionConfig::new("/mnt"),
            Arc::new(FakeDispatcher::new()),
            Arc::new(NullNameCache),
            Arc::new(FakePageCache::default()),
        );
        assert!(!session.is_dead());
        session.mark_dead();
        assert!(session.is_dead());
    }
}
