//! Error types for the buffer cache and transaction log.

use crate::txlog::FaultPoint;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in the storage core.
///
/// Variants fall into two groups. Device and format errors are ordinary
/// failures. The rest are fatal by design (see [`Error::is_fatal`]): the
/// protocol has no recovery path for them other than dropping all in-memory
/// state and re-initializing the log from disk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from a file-backed device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The block number lies beyond the end of the device.
    #[error("block {blockno} out of range on device {dev}")]
    BlockOutOfRange { dev: u32, blockno: u32 },

    /// The device id is not served by this block device.
    #[error("unknown device {0}")]
    UnknownDevice(u32),

    /// The superblock describes an unusable layout.
    #[error("invalid superblock: {0}")]
    InvalidSuperblock(&'static str),

    /// The on-disk log header holds more entries than the log can.
    #[error("corrupt log header: n = {0}")]
    CorruptLogHeader(u32),

    /// An on-disk log header entry names a block that cannot be a home block.
    #[error("corrupt log header: slot {slot} names block {blockno}")]
    CorruptLogEntry { slot: usize, blockno: u32 },

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every buffer is referenced or pinned dirty.
    #[error("bget: no buffers")]
    NoBuffers,

    /// The transaction needs more log slots than the log has.
    #[error("too big a transaction")]
    TransactionTooBig,

    /// A buffer the log protocol pinned is no longer resident.
    #[error("missing pinned {} copy of block {blockno} on device {dev}", copy_label(.old))]
    MissingPinnedBuffer { dev: u32, blockno: u32, old: bool },

    /// `log_write` was called with no operation open.
    #[error("log_write outside of transaction")]
    OutsideTransaction,

    /// `end_op` was called with no operation open.
    #[error("end_op without matching begin_op")]
    UnbalancedEndOp,

    /// A configured crash window was reached.
    #[error("injected fault: {0}")]
    InjectedFault(FaultPoint),

    /// The log stopped after an earlier fatal error.
    #[error("log halted after a fatal error")]
    Halted,
}

fn copy_label(old: &bool) -> &'static str {
    if *old {
        "old"
    } else {
        "new"
    }
}

impl Error {
    /// Whether this error is unrecoverable by design.
    ///
    /// A fatal error returned by the log halts it. The caller is expected
    /// to drop the cache and log and re-initialize from disk.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NoBuffers
                | Error::TransactionTooBig
                | Error::MissingPinnedBuffer { .. }
                | Error::OutsideTransaction
                | Error::UnbalancedEndOp
                | Error::InjectedFault(_)
                | Error::Halted
        )
    }
}
