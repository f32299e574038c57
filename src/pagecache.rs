//! Boundary to the host UBC / cluster / buffer layer (out of scope, §1).
//!
//! This crate drives paging and cluster I/O through this trait; it never
//! implements a page cache itself (Non-goals, §1).

use crate::node::NodeId;

/// Direction for a `pagein`/`pageout`-style transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingOp {
    PageIn,
    PageOut,
}

/// Host page-cache / cluster-I/O surface consumed by read/write/paging ops
/// (§4.6: `cluster_read/write/pagein/pageout`, `ubc_msync`).
pub trait PageCache: Send + Sync {
    /// Read through the page cache into the caller's buffer, returning the
    /// number of bytes actually transferred.
    fn cluster_read(&self, node: NodeId, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write through the page cache, returning the number of bytes
    /// actually transferred.
    fn cluster_write(&self, node: NodeId, offset: u64, buf: &[u8]) -> std::io::Result<usize>;

    /// Synchronously push dirty pages for `node` to backing storage.
    fn msync(&self, node: NodeId) -> std::io::Result<()>;

    /// Drop all cached pages for `node` without writing them back.
    fn invalidate(&self, node: NodeId);

    /// Inform the page cache that `node`'s authoritative size changed.
    fn setsize(&self, node: NodeId, size: u64);

    /// Enable/disable the kernel's read-ahead heuristic for `node` (used
    /// when switching a vnode to direct I/O, §4.6 `open`).
    fn set_readahead(&self, node: NodeId, enabled: bool);

    /// Service one page transfer at `blocksize` granularity (`pagein`/
    /// `pageout` vnops); returns bytes transferred.
    fn page_transfer(
        &self,
        node: NodeId,
        op: PagingOp,
        offset: u64,
        len: usize,
        blocksize: u32,
    ) -> std::io::Result<usize>;
}
