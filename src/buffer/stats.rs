//! Buffer cache counters.
//!
//! The cache bumps one [`CacheCounter`] per lookup outcome and per device
//! transfer. [`StatsSnapshot`] is a plain copy for assertions and logging;
//! the cache logs one when it shuts down.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An event counted by the buffer cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCounter {
    /// `acquire` found the working copy already cached.
    Hit,
    /// `acquire` had to recycle a slot.
    Miss,
    /// A slot was reassigned, by a miss or by `acquire_duplicate`.
    Recycle,
    /// A block was read from the device.
    BlockRead,
    /// A block was written to the device.
    BlockWrite,
}

impl CacheCounter {
    const COUNT: usize = 5;

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Counters of one buffer cache.
///
/// Bumped through `&self` with relaxed atomics: the counters are
/// independent and only ever read as a snapshot.
///
/// # Example
/// ```
/// use undolog::buffer::{BufferCacheStats, CacheCounter};
///
/// let stats = BufferCacheStats::new();
/// assert_eq!(stats.get(CacheCounter::Hit), 0);
/// assert_eq!(stats.snapshot().hit_rate(), 0.0);
/// ```
#[derive(Debug, Default)]
pub struct BufferCacheStats {
    counters: [AtomicU64; CacheCounter::COUNT],
}

impl BufferCacheStats {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `counter`.
    #[inline]
    pub(crate) fn bump(&self, counter: CacheCounter) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of one counter.
    #[inline]
    pub fn get(&self, counter: CacheCounter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.get(CacheCounter::Hit),
            cache_misses: self.get(CacheCounter::Miss),
            recycles: self.get(CacheCounter::Recycle),
            blocks_read: self.get(CacheCounter::BlockRead),
            blocks_written: self.get(CacheCounter::BlockWrite),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub recycles: u64,
    pub blocks_read: u64,
    pub blocks_written: u64,
}

impl StatsSnapshot {
    /// Fraction of lookups served without recycling, 0.0 when idle.
    pub fn hit_rate(&self) -> f64 {
        match self.cache_hits + self.cache_misses {
            0 => 0.0,
            lookups => self.cache_hits as f64 / lookups as f64,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits / {} misses ({:.1}% hit), {} recycles, {} blocks read, {} written",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate() * 100.0,
            self.recycles,
            self.blocks_read,
            self.blocks_written
        )
    }
}
