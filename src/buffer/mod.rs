//! Buffer cache.
//!
//! The buffer cache is the in-memory layer between the block device and
//! everything above it. It manages a fixed pool of buffers, each holding
//! one block.
//!
//! # Components
//! - [`BufferCache`] - The block cache and the only gateway to the device
//! - [`Buf`] / [`BufMeta`] / [`BufFlags`] - A slot and its state
//! - [`BufGuard`] - RAII handle for a referenced buffer
//! - [`BufferCacheStats`] / [`CacheCounter`] - Hit, miss and I/O counters
//! - [`replacer`] - Recency order used for lookup and recycling
//!
//! # Interface
//! - To get a buffer for a particular disk block, call `read`.
//! - After changing buffer data, call `write` to write it to disk.
//! - When done with the buffer, drop the guard.
//! - To change a block under the log, call `duplicate_for_write` instead of
//!   `read`, then hand the guard to `Log::log_write`.

mod buf;
mod buf_guard;
mod buffer_cache;
pub mod replacer;
mod stats;

pub use buf::{Buf, BufFlags, BufMeta};
pub use buf_guard::BufGuard;
pub use buffer_cache::BufferCache;
pub use stats::{BufferCacheStats, CacheCounter, StatsSnapshot};
