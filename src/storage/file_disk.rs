//! File-backed block device.
//!
//! The [`FileDisk`] stores one device as a single file:
//! - Reading and writing blocks
//! - Durable writes (`fsync` after every block)
//! - Re-opening an existing image after a crash

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::BSIZE;
use crate::common::{Error, Result};
use crate::storage::{Block, BlockDevice};

/// A disk image file serving one device id.
///
/// # File Layout
/// Blocks are laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │ Block 2 │  ...    │ Block N │
/// │ (512B)  │ (512B)  │ (512B)  │         │ (512B)  │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      512     1024    ...     N×512
/// ```
///
/// # Durability
/// Every write is followed by `fsync()`. The log protocol relies on each
/// block write being durable before the next one is issued.
pub struct FileDisk {
    file: File,
    dev: u32,
    /// Number of blocks in the file.
    block_count: u32,
}

impl FileDisk {
    /// Create a new zero-filled image of `nblocks` blocks.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, dev: u32, nblocks: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        file.set_len(nblocks as u64 * BSIZE as u64)?;
        file.sync_all()?;

        Ok(Self {
            file,
            dev,
            block_count: nblocks,
        })
    }

    /// Open an existing image.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, dev: u32) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let block_count = (file_size / BSIZE as u64) as u32;

        Ok(Self {
            file,
            dev,
            block_count,
        })
    }

    /// Device id served by this image.
    #[inline]
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// Get the total size of the image in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.block_count as u64) * (BSIZE as u64)
    }

    fn seek_to(&mut self, dev: u32, blockno: u32) -> Result<()> {
        if dev != self.dev {
            return Err(Error::UnknownDevice(dev));
        }
        if blockno >= self.block_count {
            return Err(Error::BlockOutOfRange { dev, blockno });
        }

        let offset = (blockno as u64) * (BSIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&mut self, dev: u32, blockno: u32, block: &mut Block) -> Result<()> {
        self.seek_to(dev, blockno)?;
        self.file.read_exact(block.as_mut_slice())?;
        Ok(())
    }

    fn write_block(&mut self, dev: u32, blockno: u32, block: &Block) -> Result<()> {
        self.seek_to(dev, blockno)?;
        self.file.write_all(block.as_slice())?;
        self.file.sync_all()?;
        Ok(())
    }

    fn block_count(&self) -> u32 {
        self.block_count
    }
}
