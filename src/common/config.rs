//! Configuration constants and runtime knobs.

use std::env;

use crate::common::{Error, Result};
use crate::txlog::FaultPoint;

/// Size of a disk block in bytes.
///
/// This is the unit of I/O between the buffer cache and the block device,
/// and the size of every log block (header and pre-image slots alike).
pub const BSIZE: usize = 512;

/// Maximum number of blocks any single operation writes.
pub const MAXOPBLOCKS: usize = 10;

/// Maximum number of blocks logged by one transaction.
pub const LOGSIZE: usize = MAXOPBLOCKS * 3;

/// Default number of buffers in the buffer cache.
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// Default size of a freshly formatted file system, in blocks.
pub const FSSIZE: u32 = 1000;

/// Device number of the root disk.
pub const ROOTDEV: u32 = 1;

/// Block number of the superblock. Block 0 is the boot block.
pub const SUPERBLOCK_NO: u32 = 1;

/// Environment variable consulted by [`LogConfig::from_env`].
pub const FAULT_ENV_VAR: &str = "UNDOLOG_FAULT";

/// Runtime configuration of the transaction log.
///
/// # Example
/// ```
/// use undolog::common::config::LogConfig;
/// use undolog::txlog::FaultPoint;
///
/// let config = LogConfig::default().with_fault(FaultPoint::AfterHeader);
/// assert_eq!(config.fault, Some(FaultPoint::AfterHeader));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Crash window to inject during commit, if any.
    pub fault: Option<FaultPoint>,
}

impl LogConfig {
    /// Select the crash window to inject.
    pub fn with_fault(mut self, fault: FaultPoint) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Build a config from the environment.
    ///
    /// `UNDOLOG_FAULT` may hold a fault number (`1`..`5`) or a fault name
    /// such as `after-header`. An unset or empty variable means no fault.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        match env::var(FAULT_ENV_VAR) {
            Ok(value) if value.trim().is_empty() => Ok(Self::default()),
            Ok(value) => {
                let fault = value.trim().parse::<FaultPoint>()?;
                Ok(Self { fault: Some(fault) })
            }
            Err(env::VarError::NotPresent) => Ok(Self::default()),
            Err(env::VarError::NotUnicode(_)) => Err(Error::InvalidConfig(format!(
                "{} is not valid unicode",
                FAULT_ENV_VAR
            ))),
        }
    }
}
