//! Block identifier type.

use std::fmt;

/// Identifies one block on one device.
///
/// This is the key of the buffer cache. Two buffers with the same
/// `BlockId` may be resident at once only while a transaction holds an
/// old/new snapshot pair for that block.
///
/// # Example
/// ```
/// use undolog::BlockId;
///
/// let id = BlockId::new(1, 42);
/// assert_eq!(id.dev, 1);
/// assert_eq!(id.blockno, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    /// Device number.
    pub dev: u32,
    /// Block number on that device.
    pub blockno: u32,
}

impl BlockId {
    /// Create a new BlockId.
    #[inline]
    pub fn new(dev: u32, blockno: u32) -> Self {
        BlockId { dev, blockno }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({}:{})", self.dev, self.blockno)
    }
}
