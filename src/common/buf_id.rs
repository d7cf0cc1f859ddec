//! Buffer slot identifier type.

use std::fmt;

/// Identifies a buffer slot in the buffer cache.
///
/// Slots live in a fixed `Vec` allocated when the cache is built, so a
/// `BufId` is a stable arena index: `bufs[buf_id.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufId(pub usize);

impl BufId {
    /// Create a new BufId.
    #[inline]
    pub fn new(id: usize) -> Self {
        BufId(id)
    }
}

impl fmt::Display for BufId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buf({})", self.0)
    }
}
