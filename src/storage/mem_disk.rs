//! In-memory block device.
//!
//! [`MemDisk`] keeps every block in memory behind a shared handle. Clones
//! share the same storage, which is what crash tests need: drop the buffer
//! cache and the log (the "crash"), then build new ones over a clone of the
//! disk (the "reboot") and observe exactly what was durably written.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, Result};
use crate::storage::{Block, BlockDevice};

struct MemDiskInner {
    blocks: Vec<Block>,
    reads: u64,
    writes: u64,
}

/// An in-memory disk serving one device id.
///
/// # Example
/// ```
/// use undolog::storage::{Block, BlockDevice, MemDisk};
///
/// let disk = MemDisk::new(1, 16);
/// let mut handle = disk.clone();
///
/// let mut block = Block::new();
/// block.as_mut_slice()[0] = 7;
/// handle.write_block(1, 3, &block).unwrap();
///
/// // The write is visible through every clone.
/// assert_eq!(disk.snapshot(3)[0], 7);
/// ```
#[derive(Clone)]
pub struct MemDisk {
    dev: u32,
    inner: Arc<Mutex<MemDiskInner>>,
}

impl MemDisk {
    /// Create a zero-filled disk of `nblocks` blocks for device `dev`.
    pub fn new(dev: u32, nblocks: u32) -> Self {
        let blocks = (0..nblocks).map(|_| Block::new()).collect();
        Self {
            dev,
            inner: Arc::new(Mutex::new(MemDiskInner {
                blocks,
                reads: 0,
                writes: 0,
            })),
        }
    }

    /// Device id served by this disk.
    #[inline]
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// Copy of the on-disk contents of a block.
    ///
    /// # Panics
    /// Panics if `blockno` is out of range.
    pub fn snapshot(&self, blockno: u32) -> Vec<u8> {
        self.inner.lock().blocks[blockno as usize].as_slice().to_vec()
    }

    /// Overwrite the start of a block directly, bypassing any cache.
    ///
    /// Used to seed a disk image before the cache is built.
    ///
    /// # Panics
    /// Panics if `blockno` is out of range or `bytes` is longer than a block.
    pub fn poke(&self, blockno: u32, bytes: &[u8]) {
        let mut inner = self.inner.lock();
        inner.blocks[blockno as usize].as_mut_slice()[..bytes.len()].copy_from_slice(bytes);
    }

    /// Number of completed block reads.
    pub fn reads(&self) -> u64 {
        self.inner.lock().reads
    }

    /// Number of completed block writes.
    pub fn writes(&self) -> u64 {
        self.inner.lock().writes
    }

    fn check(&self, dev: u32, blockno: u32, len: usize) -> Result<()> {
        if dev != self.dev {
            return Err(Error::UnknownDevice(dev));
        }
        if blockno as usize >= len {
            return Err(Error::BlockOutOfRange { dev, blockno });
        }
        Ok(())
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&mut self, dev: u32, blockno: u32, block: &mut Block) -> Result<()> {
        let mut inner = self.inner.lock();
        self.check(dev, blockno, inner.blocks.len())?;
        block.copy_from(&inner.blocks[blockno as usize]);
        inner.reads += 1;
        Ok(())
    }

    fn write_block(&mut self, dev: u32, blockno: u32, block: &Block) -> Result<()> {
        let mut inner = self.inner.lock();
        self.check(dev, blockno, inner.blocks.len())?;
        inner.blocks[blockno as usize].copy_from(block);
        inner.writes += 1;
        Ok(())
    }

    fn block_count(&self) -> u32 {
        self.inner.lock().blocks.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_disk_is_zeroed() {
        let disk = MemDisk::new(1, 4);
        assert_eq!(disk.block_count(), 4);
        assert!(disk.snapshot(3).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clones_share_storage() {
        let disk = MemDisk::new(1, 4);
        let mut other = disk.clone();

        let mut block = Block::new();
        block.fill(0xAA);
        other.write_block(1, 2, &block).unwrap();

        assert_eq!(disk.snapshot(2)[0], 0xAA);
        assert_eq!(disk.writes(), 1);
    }

    #[test]
    fn test_read_back() {
        let mut disk = MemDisk::new(1, 4);
        disk.poke(1, b"hello");

        let mut block = Block::new();
        disk.read_block(1, 1, &mut block).unwrap();
        assert_eq!(&block.as_slice()[..5], b"hello");
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let mut disk = MemDisk::new(1, 4);
        let mut block = Block::new();

        let result = disk.read_block(1, 4, &mut block);
        assert!(matches!(
            result,
            Err(Error::BlockOutOfRange { dev: 1, blockno: 4 })
        ));
    }

    #[test]
    fn test_unknown_device() {
        let mut disk = MemDisk::new(1, 4);
        let block = Block::new();

        let result = disk.write_block(2, 0, &block);
        assert!(matches!(result, Err(Error::UnknownDevice(2))));
    }
}
