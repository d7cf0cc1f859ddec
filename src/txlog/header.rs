//! The log header block.
//!
//! The first block of the log region records which home blocks the log
//! currently holds pre-images for. A non-zero count is the only durable
//! marker that an installation may be incomplete.

use crate::common::config::{BSIZE, LOGSIZE};
use crate::common::{Error, Result};

/// In-memory mirror of the on-disk log header.
///
/// # Layout (little-endian)
/// ```text
/// Offset  Size           Field
/// ------  -------------  -----
/// 0       4              n      (number of logged blocks)
/// 4       4 × LOGSIZE    block  (home block number of each log slot)
/// ```
///
/// Entry `i` describes log data block `start + 1 + i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHeader {
    n: usize,
    block: [u32; LOGSIZE],
}

impl LogHeader {
    /// Size of the encoded header in bytes.
    pub const SIZE: usize = 4 + 4 * LOGSIZE;

    /// An empty header (`n = 0`).
    pub fn new() -> Self {
        Self {
            n: 0,
            block: [0; LOGSIZE],
        }
    }

    /// Number of logged blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Whether no blocks are logged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Home block numbers, in log-slot order.
    #[inline]
    pub fn blocks(&self) -> &[u32] {
        &self.block[..self.n]
    }

    /// Log slot already holding `blockno`, if any.
    pub fn position(&self, blockno: u32) -> Option<usize> {
        self.blocks().iter().position(|&b| b == blockno)
    }

    /// Append `blockno` and return its slot.
    ///
    /// # Panics
    /// Panics if the header is full; callers check capacity first.
    pub(crate) fn push(&mut self, blockno: u32) -> usize {
        assert!(self.n < LOGSIZE, "log header full");
        self.block[self.n] = blockno;
        self.n += 1;
        self.n - 1
    }

    /// Forget every entry.
    pub(crate) fn clear(&mut self) {
        self.n = 0;
        self.block = [0; LOGSIZE];
    }

    /// Decode a header from the start of a block.
    ///
    /// # Errors
    /// `Error::CorruptLogHeader` if the count exceeds `LOGSIZE`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        assert!(data.len() >= Self::SIZE, "buffer too small for LogHeader");

        let word = |i: usize| {
            u32::from_le_bytes([data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]])
        };

        let n = word(0);
        if n as usize > LOGSIZE {
            return Err(Error::CorruptLogHeader(n));
        }

        let mut header = Self::new();
        for i in 0..n as usize {
            header.push(word(i + 1));
        }
        Ok(header)
    }

    /// Encode this header into the start of a block.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for LogHeader");

        data[0..4].copy_from_slice(&(self.n as u32).to_le_bytes());
        for (i, blockno) in self.block.iter().enumerate() {
            let off = 4 + i * 4;
            data[off..off + 4].copy_from_slice(&blockno.to_le_bytes());
        }
    }
}

impl Default for LogHeader {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = assert!(LogHeader::SIZE < BSIZE, "initlog: too big logheader");
