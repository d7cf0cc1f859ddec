//! RAII guard for a referenced buffer.
//!
//! A [`BufGuard`] owns one reference to a buffer slot. The reference is
//! released when the guard is dropped, which moves the buffer to the
//! most-recently-used end of the recency list once no references remain.
//!
//! A guard returned by `duplicate_for_write` also owns the reference to its
//! OLD snapshot until the log takes it over.

use std::cell::Cell;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::buffer::BufferCache;
use crate::common::{BlockId, BufId};
use crate::storage::{Block, BlockDevice};

/// A referenced buffer.
///
/// # Example
/// ```ignore
/// let mut buf = cache.read(dev, blockno)?;
/// buf.data_mut().as_mut_slice()[0] = 0xFF;
/// cache.write(&buf)?;
/// // buf drops here, reference released
/// ```
pub struct BufGuard<'a, D: BlockDevice> {
    /// Reference back to the cache for release on drop.
    cache: &'a BufferCache<D>,
    /// Slot holding the block.
    id: BufId,
    /// Cached block, for convenience.
    block: BlockId,
    /// Snapshot slot whose reference this guard still owns.
    snapshot: Cell<Option<BufId>>,
}

impl<'a, D: BlockDevice> BufGuard<'a, D> {
    /// Wrap a reference the caller already holds.
    pub(crate) fn new(cache: &'a BufferCache<D>, id: BufId, block: BlockId) -> Self {
        Self {
            cache,
            id,
            block,
            snapshot: Cell::new(None),
        }
    }

    /// Attach the snapshot reference taken alongside this working copy.
    pub(crate) fn with_snapshot(self, old: BufId) -> Self {
        self.snapshot.set(Some(old));
        self
    }

    /// The OLD snapshot this guard still holds, if any.
    #[inline]
    pub fn snapshot(&self) -> Option<BufId> {
        self.snapshot.get()
    }

    /// Hand the snapshot reference over to the caller, who must release it.
    pub(crate) fn take_snapshot(&self) -> Option<BufId> {
        self.snapshot.take()
    }

    /// Get the slot ID.
    #[inline]
    pub fn id(&self) -> BufId {
        self.id
    }

    /// Get the cached block's identifier.
    #[inline]
    pub fn block_id(&self) -> BlockId {
        self.block
    }

    /// Get the device number.
    #[inline]
    pub fn dev(&self) -> u32 {
        self.block.dev
    }

    /// Get the block number.
    #[inline]
    pub fn blockno(&self) -> u32 {
        self.block.blockno
    }

    /// Shared access to the payload.
    #[inline]
    pub fn data(&self) -> RwLockReadGuard<'_, Block> {
        self.cache.data(self.id)
    }

    /// Exclusive access to the payload.
    ///
    /// Holding the returned lock borrows the guard mutably, so it cannot be
    /// passed to [`BufferCache::write`] or the log until the lock is dropped.
    #[inline]
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Block> {
        self.cache.data_mut(self.id)
    }

    /// Release the reference now. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl<D: BlockDevice> Drop for BufGuard<'_, D> {
    fn drop(&mut self) {
        self.cache.release(self.id);
        if let Some(old) = self.snapshot.take() {
            self.cache.release(old);
        }
    }
}
