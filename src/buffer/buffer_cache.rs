//! Buffer Cache - the fixed pool of cached disk blocks.
//!
//! The [`BufferCache`] provides:
//! - Block caching between the device and its callers
//! - Reference counting, plus the DIRTY pin used by the log
//! - Least-recently-released-first recycling
//! - Old/new snapshot pairs for undo logging
//!
//! It is the only path to the block device.

use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};

use crate::buffer::replacer::MruList;
use crate::buffer::{Buf, BufFlags, BufGuard, BufMeta, BufferCacheStats, CacheCounter};
use crate::common::config::NBUF;
use crate::common::{BlockId, BufId, Error, Result};
use crate::storage::{Block, BlockDevice};

/// Slot metadata and recency order, guarded together.
struct CacheInner {
    metas: Vec<BufMeta>,
    recency: MruList,
}

/// A fixed pool of buffers caching blocks of one block device.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                        BufferCache                          │
/// │  ┌──────────────────────────┐  ┌─────────────────────────┐  │
/// │  │ inner: Mutex             │  │    bufs: Vec<Buf>       │  │
/// │  │  metas: Vec<BufMeta>     │─▶│ [Buf0] [Buf1] [Buf2] .. │  │
/// │  │  recency: MruList        │  │  (RwLock<Block> each)   │  │
/// │  └──────────────────────────┘  └─────────────────────────┘  │
/// │  ┌──────────────────────────┐  ┌─────────────────────────┐  │
/// │  │ device: Mutex<D>         │  │ stats (atomic counters) │  │
/// │  └──────────────────────────┘  └─────────────────────────┘  │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Locking
/// - `inner` is held only for scans and metadata updates, never across I/O.
/// - A payload lock is never taken while `inner` is held.
/// - `device` serializes I/O: one transfer in flight at a time.
///
/// # Exhaustion
/// There is no waiting. When every buffer is referenced or pinned DIRTY,
/// a miss fails with the fatal `Error::NoBuffers`.
pub struct BufferCache<D: BlockDevice> {
    /// Fixed pool of buffers allocated at startup.
    bufs: Vec<Buf>,

    inner: Mutex<CacheInner>,

    /// Handles all device I/O.
    device: Mutex<D>,

    /// Performance statistics.
    stats: BufferCacheStats,

    /// Number of buffers (immutable after construction).
    capacity: usize,
}

impl<D: BlockDevice> BufferCache<D> {
    /// Create a buffer cache of `capacity` buffers over `device`.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, device: D) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        let bufs: Vec<Buf> = (0..capacity).map(|_| Buf::new()).collect();

        Self {
            bufs,
            inner: Mutex::new(CacheInner {
                metas: vec![BufMeta::default(); capacity],
                recency: MruList::new(capacity),
            }),
            device: Mutex::new(device),
            stats: BufferCacheStats::new(),
            capacity,
        }
    }

    /// Create a buffer cache of [`NBUF`] buffers.
    pub fn with_default_capacity(device: D) -> Self {
        Self::new(NBUF, device)
    }

    // ========================================================================
    // Slot lookup and allocation
    // ========================================================================

    /// Get a referenced buffer for `(dev, blockno)`.
    ///
    /// Scans from the most-recently-used end for the working copy of the
    /// block; snapshots tagged OLD never match. On a miss, recycles the
    /// least recently released idle buffer. The payload is not read.
    ///
    /// # Errors
    /// `Error::NoBuffers` if every buffer is referenced or pinned DIRTY.
    pub fn acquire(&self, dev: u32, blockno: u32) -> Result<BufId> {
        let mut inner = self.inner.lock();

        let hit = inner
            .recency
            .iter_mru()
            .find(|id| {
                let meta = &inner.metas[id.0];
                meta.holds(dev, blockno) && !meta.is_old()
            });

        if let Some(id) = hit {
            inner.metas[id.0].refcnt += 1;
            self.stats.bump(CacheCounter::Hit);
            log::trace!("bcache hit {} in {}", BlockId::new(dev, blockno), id);
            return Ok(id);
        }

        self.stats.bump(CacheCounter::Miss);
        self.recycle(&mut inner, dev, blockno)
    }

    /// Get a second, independent buffer for `(dev, blockno)`.
    ///
    /// Always recycles, even if the block is already cached. This is how a
    /// snapshot slot is obtained next to the working copy.
    ///
    /// # Errors
    /// `Error::NoBuffers` if every buffer is referenced or pinned DIRTY.
    pub fn acquire_duplicate(&self, dev: u32, blockno: u32) -> Result<BufId> {
        let mut inner = self.inner.lock();
        self.recycle(&mut inner, dev, blockno)
    }

    /// Find the pinned old or new copy of a block without taking a reference.
    ///
    /// The caller must have pinned the copy it is looking for, by reference
    /// or by DIRTY. Idle copies are ignored, so a stale snapshot left over
    /// from an earlier write is never returned.
    ///
    /// # Errors
    /// `Error::MissingPinnedBuffer` if no such copy is resident. This is a
    /// protocol violation, not a runtime condition.
    pub fn find_tagged(&self, dev: u32, blockno: u32, want_old: bool) -> Result<BufId> {
        let inner = self.inner.lock();

        let found = inner.recency.iter_mru().find(|id| {
            let meta = &inner.metas[id.0];
            meta.holds(dev, blockno) && meta.is_old() == want_old && meta.is_pinned()
        });
        found.ok_or(Error::MissingPinnedBuffer {
            dev,
            blockno,
            old: want_old,
        })
    }

    /// Release one reference.
    ///
    /// When the count reaches zero the buffer moves to the most-recently-used
    /// end, where it becomes recyclable unless pinned DIRTY. No I/O.
    ///
    /// # Panics
    /// Panics if the buffer has no references.
    pub fn release(&self, id: BufId) {
        let mut inner = self.inner.lock();

        let meta = &mut inner.metas[id.0];
        assert!(meta.refcnt > 0, "refcount underflow");
        meta.refcnt -= 1;

        if meta.refcnt == 0 {
            inner.recency.move_to_front(id);
        }
    }

    // ========================================================================
    // Block I/O
    // ========================================================================

    /// Return a referenced buffer holding the contents of a block.
    ///
    /// # Errors
    /// `Error::NoBuffers`, or any device error.
    pub fn read(&self, dev: u32, blockno: u32) -> Result<BufGuard<'_, D>> {
        let id = self.acquire(dev, blockno)?;
        let guard = BufGuard::new(self, id, BlockId::new(dev, blockno));

        if !self.meta(id).flags.contains(BufFlags::VALID) {
            self.device_rw(id)?;
        }
        Ok(guard)
    }

    /// Write a buffer's contents to its home block.
    ///
    /// The caller keeps its reference.
    ///
    /// # Errors
    /// Any device error.
    pub fn write(&self, buf: &BufGuard<'_, D>) -> Result<()> {
        self.write_id(buf.id())
    }

    /// Make an old/new pair for a block about to be modified.
    ///
    /// Acquires the working ("new") copy and a second ("old") slot, copies
    /// the new copy's payload and flags into the old one, reads both from
    /// disk if the block was not yet valid, then tags the old copy OLD.
    ///
    /// The returned guard is the new copy, for mutation. It also owns the
    /// old copy's reference until `Log::log_write` captures the pre-image;
    /// a guard dropped without logging releases the snapshot with it.
    ///
    /// # Errors
    /// `Error::NoBuffers`, or any device error.
    pub fn duplicate_for_write(&self, dev: u32, blockno: u32) -> Result<BufGuard<'_, D>> {
        let new = self.acquire(dev, blockno)?;
        let new_guard = BufGuard::new(self, new, BlockId::new(dev, blockno));

        let old = self.acquire_duplicate(dev, blockno)?;
        if let Err(err) = self.fill_snapshot(new, old) {
            self.discard_snapshot(old);
            return Err(err);
        }

        log::debug!(
            "bcache snapshot {}: new {} old {}",
            BlockId::new(dev, blockno),
            new,
            old
        );
        Ok(new_guard.with_snapshot(old))
    }

    fn fill_snapshot(&self, new: BufId, old: BufId) -> Result<()> {
        {
            let src = self.bufs[new.0].data();
            self.bufs[old.0].data_mut().copy_from(&src);
        }

        let flags = {
            let mut inner = self.inner.lock();
            let flags = inner.metas[new.0].flags;
            inner.metas[old.0].flags = flags;
            flags
        };

        if !flags.contains(BufFlags::VALID) {
            self.device_rw(new)?;
            self.device_rw(old)?;
        }

        // The snapshot is held by its reference, never by the DIRTY pin.
        let mut inner = self.inner.lock();
        let flags = &mut inner.metas[old.0].flags;
        flags.insert(BufFlags::OLD);
        flags.remove(BufFlags::DIRTY);
        Ok(())
    }

    /// Drop a snapshot slot that was never filled.
    ///
    /// Tagged OLD and not VALID, it can neither be found as the working copy
    /// nor counted as a live copy of its block.
    fn discard_snapshot(&self, old: BufId) {
        self.inner.lock().metas[old.0].flags = BufFlags::OLD;
        self.release(old);
    }

    // ========================================================================
    // Payload and metadata access
    // ========================================================================

    /// Shared access to a buffer's payload.
    #[inline]
    pub fn data(&self, id: BufId) -> RwLockReadGuard<'_, Block> {
        self.bufs[id.0].data()
    }

    /// Exclusive access to a buffer's payload.
    #[inline]
    pub fn data_mut(&self, id: BufId) -> RwLockWriteGuard<'_, Block> {
        self.bufs[id.0].data_mut()
    }

    /// Copy of a buffer's metadata.
    pub fn meta(&self, id: BufId) -> BufMeta {
        self.inner.lock().metas[id.0]
    }

    /// Buffers currently holding a live copy of `(dev, blockno)`.
    pub fn resident_copies(&self, dev: u32, blockno: u32) -> Vec<BufId> {
        let inner = self.inner.lock();
        inner
            .recency
            .iter_mru()
            .filter(|id| {
                let meta = &inner.metas[id.0];
                meta.holds(dev, blockno) && meta.is_live()
            })
            .collect()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &BufferCacheStats {
        &self.stats
    }

    /// Get the number of buffers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks on the underlying device.
    pub fn device_blocks(&self) -> u32 {
        self.device.lock().block_count()
    }

    // ========================================================================
    // Internal: log protocol hooks
    // ========================================================================

    /// Write a buffer the caller has pinned, without a guard.
    pub(crate) fn write_id(&self, id: BufId) -> Result<()> {
        self.inner.lock().metas[id.0].flags.insert(BufFlags::DIRTY);
        self.device_rw(id)
    }

    /// Pin a buffer against recycling independently of its references.
    pub(crate) fn pin_dirty(&self, id: BufId) {
        self.inner.lock().metas[id.0].flags.insert(BufFlags::DIRTY);
    }

    /// Drop the DIRTY pin.
    pub(crate) fn unpin_dirty(&self, id: BufId) {
        self.inner.lock().metas[id.0].flags.remove(BufFlags::DIRTY);
    }

    // ========================================================================
    // Internal: recycling and device transfer
    // ========================================================================

    /// Reassign the least recently released idle buffer to `(dev, blockno)`.
    fn recycle(&self, inner: &mut CacheInner, dev: u32, blockno: u32) -> Result<BufId> {
        let victim = inner
            .recency
            .iter_lru()
            .find(|id| inner.metas[id.0].is_recyclable());

        let Some(id) = victim else {
            log::error!(
                "bcache: no buffers for {} ({} all referenced or dirty)",
                BlockId::new(dev, blockno),
                self.capacity
            );
            return Err(Error::NoBuffers);
        };

        let meta = &mut inner.metas[id.0];
        log::trace!(
            "bcache recycle {} from {} to {}",
            id,
            meta.block_id(),
            BlockId::new(dev, blockno)
        );
        meta.reassign(dev, blockno);
        self.stats.bump(CacheCounter::Recycle);
        Ok(id)
    }

    /// Synchronous transfer in the direction the flags call for.
    ///
    /// DIRTY: write the payload, then clear DIRTY. Not VALID: read into the
    /// payload. Either way the buffer ends up VALID.
    fn device_rw(&self, id: BufId) -> Result<()> {
        let meta = self.meta(id);

        {
            let mut device = self.device.lock();
            if meta.flags.contains(BufFlags::DIRTY) {
                let data = self.bufs[id.0].data();
                device.write_block(meta.dev, meta.blockno, &data)?;
                self.stats.bump(CacheCounter::BlockWrite);
            } else if !meta.flags.contains(BufFlags::VALID) {
                let mut data = self.bufs[id.0].data_mut();
                device.read_block(meta.dev, meta.blockno, &mut data)?;
                self.stats.bump(CacheCounter::BlockRead);
            } else {
                return Ok(());
            }
        }

        let mut inner = self.inner.lock();
        let flags = &mut inner.metas[id.0].flags;
        flags.insert(BufFlags::VALID);
        flags.remove(BufFlags::DIRTY);
        Ok(())
    }
}

impl<D: BlockDevice> Drop for BufferCache<D> {
    fn drop(&mut self) {
        log::debug!("bcache shutdown: {}", self.stats.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemDisk;
    use proptest::prelude::*;

    const DEV: u32 = 1;

    fn create_test_cache(capacity: usize) -> (BufferCache<MemDisk>, MemDisk) {
        let disk = MemDisk::new(DEV, 64);
        (BufferCache::new(capacity, disk.clone()), disk)
    }

    #[test]
    fn test_read_fills_from_disk() {
        let (cache, disk) = create_test_cache(4);
        disk.poke(5, b"five");

        let buf = cache.read(DEV, 5).unwrap();
        assert_eq!(&buf.data().as_slice()[..4], b"five");
        assert!(cache.meta(buf.id()).flags.contains(BufFlags::VALID));
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn test_cache_hit_skips_disk() {
        let (cache, disk) = create_test_cache(4);

        drop(cache.read(DEV, 3).unwrap());
        drop(cache.read(DEV, 3).unwrap());

        assert_eq!(disk.reads(), 1);
        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
    }

    #[test]
    fn test_same_block_same_buffer() {
        let (cache, _disk) = create_test_cache(4);

        let a = cache.read(DEV, 2).unwrap();
        let b = cache.read(DEV, 2).unwrap();

        assert_eq!(a.id(), b.id());
        assert_eq!(cache.meta(a.id()).refcnt, 2);

        drop(b);
        assert_eq!(cache.meta(a.id()).refcnt, 1);
    }

    #[test]
    fn test_write_reaches_disk_and_clears_dirty() {
        let (cache, disk) = create_test_cache(4);

        let mut buf = cache.read(DEV, 7).unwrap();
        buf.data_mut().fill(0x77);
        cache.write(&buf).unwrap();

        assert!(disk.snapshot(7).iter().all(|&b| b == 0x77));
        let meta = cache.meta(buf.id());
        assert!(meta.flags.contains(BufFlags::VALID));
        assert!(!meta.flags.contains(BufFlags::DIRTY));
    }

    #[test]
    fn test_release_moves_to_front() {
        let (cache, _disk) = create_test_cache(3);

        let id = cache.read(DEV, 1).unwrap().id();

        let inner = cache.inner.lock();
        assert_eq!(inner.recency.iter_mru().next(), Some(id));
    }

    #[test]
    fn test_recycles_least_recently_released() {
        let (cache, _disk) = create_test_cache(2);

        let first = cache.read(DEV, 1).unwrap().id();
        let second = cache.read(DEV, 2).unwrap().id();
        assert_ne!(first, second);

        // Block 1 was released first, so its slot goes.
        let third = cache.read(DEV, 3).unwrap().id();
        assert_eq!(third, first);
        assert!(cache.resident_copies(DEV, 1).is_empty());
        assert_eq!(cache.resident_copies(DEV, 2), vec![second]);
    }

    #[test]
    fn test_no_buffers_when_all_referenced() {
        let (cache, _disk) = create_test_cache(2);

        let _a = cache.read(DEV, 1).unwrap();
        let _b = cache.read(DEV, 2).unwrap();

        let result = cache.read(DEV, 3);
        assert!(matches!(result, Err(Error::NoBuffers)));
    }

    #[test]
    fn test_dirty_pin_blocks_recycling() {
        let (cache, _disk) = create_test_cache(1);

        let id = cache.read(DEV, 1).unwrap().id();
        cache.pin_dirty(id);
        assert_eq!(cache.meta(id).refcnt, 0);

        assert!(matches!(cache.acquire(DEV, 2), Err(Error::NoBuffers)));

        cache.unpin_dirty(id);
        assert_eq!(cache.acquire(DEV, 2).unwrap(), id);
    }

    #[test]
    #[should_panic(expected = "refcount underflow")]
    fn test_release_underflow() {
        let (cache, _disk) = create_test_cache(1);
        cache.release(BufId::new(0));
    }

    #[test]
    fn test_duplicate_for_write_snapshot() {
        let (cache, disk) = create_test_cache(4);
        disk.poke(9, b"before");

        let mut new = cache.duplicate_for_write(DEV, 9).unwrap();
        new.data_mut().as_mut_slice()[..5].copy_from_slice(b"after");

        let old = cache.find_tagged(DEV, 9, true).unwrap();
        assert_ne!(old, new.id());
        assert_eq!(&cache.data(old).as_slice()[..6], b"before");
        assert_eq!(&new.data().as_slice()[..5], b"after");

        let old_meta = cache.meta(old);
        assert!(old_meta.is_old());
        assert!(old_meta.flags.contains(BufFlags::VALID));
        assert_eq!(old_meta.refcnt, 1);
        assert_eq!(cache.resident_copies(DEV, 9).len(), 2);
    }

    #[test]
    fn test_duplicate_of_cached_block_copies_payload() {
        let (cache, disk) = create_test_cache(4);

        {
            let mut buf = cache.read(DEV, 4).unwrap();
            buf.data_mut().fill(0x44);
        }
        let reads = disk.reads();

        let new = cache.duplicate_for_write(DEV, 4).unwrap();
        let old = cache.find_tagged(DEV, 4, true).unwrap();

        // Payload came from the cached copy, not the disk.
        assert_eq!(disk.reads(), reads);
        assert_eq!(cache.data(old).as_slice()[0], 0x44);
        assert_eq!(new.data().as_slice()[0], 0x44);
    }

    #[test]
    fn test_acquire_never_returns_snapshot() {
        let (cache, _disk) = create_test_cache(4);

        let new = cache.duplicate_for_write(DEV, 6).unwrap();
        let new_id = new.id();
        let old = cache.find_tagged(DEV, 6, true).unwrap();
        drop(new);

        // The snapshot was released last and sits at the MRU end.
        assert_eq!(cache.resident_copies(DEV, 6), vec![old, new_id]);
        assert_eq!(cache.acquire(DEV, 6).unwrap(), new_id);
    }

    #[test]
    fn test_abandoned_snapshot_is_released() {
        let (cache, _disk) = create_test_cache(4);

        for blockno in 0..16 {
            let mut buf = cache.duplicate_for_write(DEV, blockno).unwrap();
            buf.data_mut().fill(0xEE);
            // Dropped without logging.
        }

        for i in 0..4 {
            let meta = cache.meta(BufId::new(i));
            assert_eq!(meta.refcnt, 0);
            assert!(meta.is_recyclable());
        }
    }

    #[test]
    fn test_snapshot_of_pinned_copy_is_not_dirty() {
        let (cache, _disk) = create_test_cache(4);

        let id = cache.read(DEV, 3).unwrap().id();
        cache.pin_dirty(id);

        let new = cache.duplicate_for_write(DEV, 3).unwrap();
        assert_eq!(new.id(), id);
        let old = cache.find_tagged(DEV, 3, true).unwrap();
        assert!(!cache.meta(old).flags.contains(BufFlags::DIRTY));

        drop(new);
        assert!(cache.meta(old).is_recyclable());
        assert!(cache.meta(id).is_pinned());
    }

    #[test]
    fn test_failed_snapshot_leaves_one_working_copy() {
        let (cache, _disk) = create_test_cache(4);

        assert!(matches!(
            cache.duplicate_for_write(DEV, 1000),
            Err(Error::BlockOutOfRange { .. })
        ));

        let working: Vec<BufId> = (0..4)
            .map(BufId::new)
            .filter(|&id| {
                let meta = cache.meta(id);
                meta.holds(DEV, 1000) && !meta.is_old()
            })
            .collect();
        assert_eq!(working.len(), 1);
        assert!(cache.resident_copies(DEV, 1000).is_empty());
        assert!((0..4).all(|i| cache.meta(BufId::new(i)).refcnt == 0));
    }

    #[test]
    fn test_find_tagged_requires_pin() {
        let (cache, _disk) = create_test_cache(4);

        drop(cache.read(DEV, 8).unwrap());

        let result = cache.find_tagged(DEV, 8, false);
        assert!(matches!(
            result,
            Err(Error::MissingPinnedBuffer {
                dev: DEV,
                blockno: 8,
                old: false
            })
        ));
    }

    #[test]
    fn test_device_error_releases_reference() {
        let (cache, _disk) = create_test_cache(1);

        assert!(matches!(
            cache.read(DEV, 1000),
            Err(Error::BlockOutOfRange { .. })
        ));
        assert_eq!(cache.meta(BufId::new(0)).refcnt, 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Acquire(u32),
        Release(usize),
        Pin(usize),
        Unpin(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..12).prop_map(Op::Acquire),
            any::<usize>().prop_map(Op::Release),
            any::<usize>().prop_map(Op::Pin),
            any::<usize>().prop_map(Op::Unpin),
        ]
    }

    proptest! {
        /// A referenced or DIRTY buffer is never chosen by the recycle scan,
        /// and repeated acquisitions of a cached block share one buffer.
        #[test]
        fn prop_recycle_never_takes_pinned(ops in prop::collection::vec(op_strategy(), 1..200)) {
            let (cache, _disk) = create_test_cache(4);
            let mut held: Vec<BufId> = Vec::new();

            for op in ops {
                match op {
                    Op::Acquire(blockno) => {
                        let before: Vec<BufMeta> =
                            (0..4).map(|i| cache.meta(BufId::new(i))).collect();
                        match cache.acquire(DEV, blockno) {
                            Ok(id) => {
                                let prev = before[id.0];
                                if prev.holds(DEV, blockno) && prev.is_live() {
                                    // Hit: same buffer, one more reference.
                                    prop_assert_eq!(cache.meta(id).refcnt, prev.refcnt + 1);
                                } else {
                                    prop_assert!(prev.is_recyclable());
                                    prop_assert_eq!(cache.meta(id).refcnt, 1);
                                }
                                held.push(id);
                            }
                            Err(Error::NoBuffers) => {
                                prop_assert!(before.iter().all(|m| m.is_pinned()));
                            }
                            Err(other) => prop_assert!(false, "unexpected error {}", other),
                        }
                    }
                    Op::Release(i) if !held.is_empty() => {
                        let id = held.swap_remove(i % held.len());
                        cache.release(id);
                    }
                    Op::Pin(i) if !held.is_empty() => {
                        let id = held[i % held.len()];
                        cache.pin_dirty(id);
                        // Mark it valid so it looks like a cached block.
                        cache.inner.lock().metas[id.0].flags.insert(BufFlags::VALID);
                    }
                    Op::Unpin(i) => cache.unpin_dirty(BufId::new(i % 4)),
                    _ => {}
                }
            }
        }
    }
}
