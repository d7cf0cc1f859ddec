//! Buffer slots and their metadata.
//!
//! A [`Buf`] holds one block's payload. The metadata needed for cache
//! management lives in [`BufMeta`], kept by the cache under its own lock so
//! that lookup and recycle scans see a consistent view of every slot:
//! - Which block is cached (device and block number)
//! - Reference count
//! - State flags (VALID, DIRTY, OLD)

use bitflags::bitflags;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::BlockId;
use crate::storage::Block;

bitflags! {
    /// Buffer state flags.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u8 {
        /// The payload reflects on-disk content.
        const VALID = 0x2;
        /// The payload must reach disk, or the buffer is pinned for the log.
        const DIRTY = 0x4;
        /// The buffer is a pre-image snapshot, not the working copy.
        const OLD   = 0x8;
    }
}

/// Cache-management state of one buffer slot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufMeta {
    /// Device number of the cached block.
    pub dev: u32,
    /// Block number of the cached block.
    pub blockno: u32,
    /// Number of outstanding references.
    pub refcnt: u32,
    /// State flags.
    pub flags: BufFlags,
}

impl BufMeta {
    /// The cached block's identifier.
    #[inline]
    pub fn block_id(&self) -> BlockId {
        BlockId::new(self.dev, self.blockno)
    }

    /// Whether this slot caches `(dev, blockno)`.
    #[inline]
    pub fn holds(&self, dev: u32, blockno: u32) -> bool {
        self.dev == dev && self.blockno == blockno
    }

    /// Whether this slot is a pre-image snapshot.
    #[inline]
    pub fn is_old(&self) -> bool {
        self.flags.contains(BufFlags::OLD)
    }

    /// Whether the recycle scan may take this slot.
    ///
    /// DIRTY pins a buffer independently of its reference count.
    #[inline]
    pub fn is_recyclable(&self) -> bool {
        self.refcnt == 0 && !self.flags.contains(BufFlags::DIRTY)
    }

    /// Whether the slot is held by a reference or by the DIRTY pin.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        !self.is_recyclable()
    }

    /// Whether the slot holds a live copy of its block.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.refcnt > 0 || self.flags.intersects(BufFlags::VALID | BufFlags::DIRTY)
    }

    /// Reassign this slot to a new block, as the recycle scan does.
    pub(crate) fn reassign(&mut self, dev: u32, blockno: u32) {
        self.dev = dev;
        self.blockno = blockno;
        self.flags = BufFlags::empty();
        self.refcnt = 1;
    }
}

/// A buffer slot: one block's payload behind a reader/writer lock.
pub struct Buf {
    data: RwLock<Block>,
}

impl Buf {
    /// Create a new zeroed slot.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Block::new()),
        }
    }

    /// Acquire read lock on the payload.
    #[inline]
    pub fn data(&self) -> RwLockReadGuard<'_, Block> {
        self.data.read()
    }

    /// Acquire write lock on the payload.
    #[inline]
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Block> {
        self.data.write()
    }
}

impl Default for Buf {
    fn default() -> Self {
        Self::new()
    }
}
