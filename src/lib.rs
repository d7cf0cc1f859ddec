//! undolog - A block buffer cache and an undo-style write-ahead log.
//!
//! Together they guarantee that the disk blocks touched by a transaction
//! survive a crash either in their pre-transaction or their
//! post-transaction state, never partially written.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            undolog                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Transaction Log (txlog/)                       │   │
//! │  │   begin_op / log_write / end_op  →  commit / recovery    │   │
//! │  │   FaultPoint: deterministic crash windows                │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Buffer Cache (buffer/)                         │   │
//! │  │   fixed pool, MRU lookup, LRU recycle, DIRTY pinning,    │   │
//! │  │   old/new snapshot pairs                                 │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │   BlockDevice: MemDisk | FileDisk, Superblock, mkfs      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, BufId, Error, config)
//! - [`buffer`] - The buffer cache
//! - [`storage`] - Block devices and on-disk formats
//! - [`txlog`] - The undo log, commit and recovery
//!
//! # Quick Start
//! ```
//! use undolog::storage::{mkfs, MemDisk, Superblock};
//! use undolog::{BufferCache, Log, ROOTDEV};
//!
//! let disk = MemDisk::new(ROOTDEV, 1000);
//! mkfs(&mut disk.clone(), ROOTDEV, &Superblock::layout(1000, 30, 200)).unwrap();
//!
//! let cache = BufferCache::with_default_capacity(disk.clone());
//! let log = Log::init(&cache, ROOTDEV).unwrap();
//!
//! log.transaction(|log| {
//!     let mut buf = cache.duplicate_for_write(ROOTDEV, 500)?;
//!     buf.data_mut().as_mut_slice()[0] = 0xAB;
//!     log.log_write(&buf)
//! })
//! .unwrap();
//!
//! assert_eq!(disk.snapshot(500)[0], 0xAB);
//! ```

pub mod buffer;
pub mod common;
pub mod storage;
pub mod txlog;

// Re-export commonly used items at crate root for convenience
pub use common::config::{BSIZE, LOGSIZE, NBUF, ROOTDEV};
pub use common::{BlockId, BufId, Error, Result};

pub use buffer::{
    BufFlags, BufGuard, BufMeta, BufferCache, BufferCacheStats, CacheCounter, StatsSnapshot,
};
pub use storage::{Block, BlockDevice, FileDisk, MemDisk, Superblock};
pub use txlog::{FaultPoint, Log, LogHeader};
