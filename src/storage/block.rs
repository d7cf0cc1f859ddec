//! Block - the fundamental unit of disk storage.
//!
//! A [`Block`] is a raw `BSIZE`-byte array that serves as the unit of I/O
//! between the block device and the buffer cache.

use crate::common::config::BSIZE;

/// One block's worth of bytes.
///
/// `Block` does NOT implement `Clone` in production code: copying a block
/// between buffers is a protocol step (snapshotting a pre-image, filling a
/// log slot) and is written out with [`Block::copy_from`].
///
/// # Example
/// ```
/// use undolog::storage::Block;
///
/// let mut block = Block::new();
/// block.as_mut_slice()[0] = 0xFF;
/// assert_eq!(block.as_slice()[0], 0xFF);
/// ```
#[repr(align(512))]
pub struct Block {
    data: [u8; BSIZE],
}

impl Block {
    /// Create a new zeroed block.
    #[inline]
    pub fn new() -> Self {
        Self { data: [0u8; BSIZE] }
    }

    /// Get immutable slice of block data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of block data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Overwrite this block with the contents of another.
    #[inline]
    pub fn copy_from(&mut self, other: &Block) {
        self.data.copy_from_slice(&other.data);
    }

    /// Fill the whole block with one byte value.
    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// Zero out the entire block.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Get the size of a block.
    #[inline]
    pub const fn size() -> usize {
        BSIZE
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clone for Block {
    fn clone(&self) -> Self {
        let mut block = Block::new();
        block.copy_from(self);
        block
    }
}
