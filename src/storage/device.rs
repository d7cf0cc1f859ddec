//! The block device contract consumed by the buffer cache.

use crate::common::Result;
use crate::storage::Block;

/// A synchronous block device.
///
/// Every call blocks until the transfer is complete. There is no partial
/// outcome: a call either moves the whole block or returns an error.
///
/// The buffer cache is the only caller. It decides the direction from the
/// buffer's flags: a DIRTY buffer is written, a buffer without VALID is read.
pub trait BlockDevice: Send {
    /// Read block `blockno` of device `dev` into `block`.
    fn read_block(&mut self, dev: u32, blockno: u32, block: &mut Block) -> Result<()>;

    /// Write `block` to block `blockno` of device `dev`.
    fn write_block(&mut self, dev: u32, blockno: u32, block: &Block) -> Result<()>;

    /// Number of blocks on the device.
    fn block_count(&self) -> u32;
}
