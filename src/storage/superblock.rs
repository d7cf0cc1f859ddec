//! Superblock - the on-disk description of the file-system layout.
//!
//! Only the log region fields matter to this crate; the rest are carried so
//! that an image formatted here has the usual layout.

use crate::buffer::BufferCache;
use crate::common::config::{BSIZE, SUPERBLOCK_NO};
use crate::common::{Error, Result};
use crate::storage::{Block, BlockDevice};

/// Bytes per on-disk inode.
const DINODE_SIZE: u32 = 64;

/// Inodes per block.
const IPB: u32 = BSIZE as u32 / DINODE_SIZE;

/// Bitmap bits per block.
const BPB: u32 = BSIZE as u32 * 8;

/// On-disk superblock.
///
/// # Layout (28 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     size        (blocks in the image)
/// 4       4     nblocks     (data blocks)
/// 8       4     ninodes
/// 12      4     nlog        (log blocks, header included)
/// 16      4     logstart    (first log block)
/// 20      4     inodestart
/// 24      4     bmapstart
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub size: u32,
    pub nblocks: u32,
    pub ninodes: u32,
    pub nlog: u32,
    pub logstart: u32,
    pub inodestart: u32,
    pub bmapstart: u32,
}

impl Superblock {
    /// Size of the encoded superblock in bytes.
    pub const SIZE: usize = 28;

    /// Compute the standard layout for an image of `fs_size` blocks.
    ///
    /// Block 0 is the boot block, block 1 the superblock, the log starts at
    /// block 2 and is followed by the inode blocks, the free bitmap and the
    /// data blocks.
    pub fn layout(fs_size: u32, nlog: u32, ninodes: u32) -> Self {
        let ninodeblocks = ninodes / IPB + 1;
        let nbitmap = fs_size / BPB + 1;
        let nmeta = 2 + nlog + ninodeblocks + nbitmap;

        Self {
            size: fs_size,
            nblocks: fs_size.saturating_sub(nmeta),
            ninodes,
            nlog,
            logstart: 2,
            inodestart: 2 + nlog,
            bmapstart: 2 + nlog + ninodeblocks,
        }
    }

    /// Decode a superblock from the start of a block.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for Superblock");

        let field = |i: usize| {
            u32::from_le_bytes([data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]])
        };

        Self {
            size: field(0),
            nblocks: field(1),
            ninodes: field(2),
            nlog: field(3),
            logstart: field(4),
            inodestart: field(5),
            bmapstart: field(6),
        }
    }

    /// Encode this superblock into the start of a block.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for Superblock");

        let fields = [
            self.size,
            self.nblocks,
            self.ninodes,
            self.nlog,
            self.logstart,
            self.inodestart,
            self.bmapstart,
        ];
        for (i, value) in fields.iter().enumerate() {
            data[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Check that the log region is usable on a device of `device_blocks`.
    ///
    /// # Errors
    /// Returns `Error::InvalidSuperblock` describing the first problem found.
    pub fn validate(&self, device_blocks: u32) -> Result<()> {
        if self.size > device_blocks {
            return Err(Error::InvalidSuperblock("image larger than device"));
        }
        if self.nlog < 2 {
            return Err(Error::InvalidSuperblock("log too small"));
        }
        if self.logstart <= SUPERBLOCK_NO {
            return Err(Error::InvalidSuperblock("log overlaps superblock"));
        }
        match self.logstart.checked_add(self.nlog) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::InvalidSuperblock("log region past end of image")),
        }
    }
}

/// Read the superblock of `dev` through the buffer cache.
///
/// # Errors
/// Propagates device errors and `Error::NoBuffers`.
pub fn read_superblock<D: BlockDevice>(cache: &BufferCache<D>, dev: u32) -> Result<Superblock> {
    let buf = cache.read(dev, SUPERBLOCK_NO)?;
    let sb = Superblock::from_bytes(buf.data().as_slice());
    Ok(sb)
}

/// Format a device: write the superblock and an empty log header.
///
/// Writes go straight to the device; no buffer cache may be live over it.
///
/// # Errors
/// Returns `Error::InvalidSuperblock` if `sb` does not fit the device, or
/// any device error.
pub fn mkfs<D: BlockDevice>(device: &mut D, dev: u32, sb: &Superblock) -> Result<()> {
    sb.validate(device.block_count())?;

    let mut block = Block::new();
    sb.write_to(block.as_mut_slice());
    device.write_block(dev, SUPERBLOCK_NO, &block)?;

    // An all-zero header block is a log with n = 0.
    block.reset();
    device.write_block(dev, sb.logstart, &block)?;

    log::debug!(
        "mkfs dev {}: size {} log {}+{} inodes@{} bitmap@{}",
        dev,
        sb.size,
        sb.logstart,
        sb.nlog,
        sb.inodestart,
        sb.bmapstart
    );
    Ok(())
}
