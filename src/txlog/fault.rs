//! Deterministic crash points inside commit.

use std::fmt;
use std::str::FromStr;

use crate::common::{Error, Result};

/// A protocol boundary at which commit can be made to abort.
///
/// Each point is a crash window the next boot's recovery must handle. The
/// numbering is stable and is what `UNDOLOG_FAULT` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Before the header write: nothing durable yet.
    BeforeHeader = 1,
    /// After the header write, before any home block is installed.
    AfterHeader = 2,
    /// After every home block is installed, before the header is cleared.
    AfterInstall = 3,
    /// After the header is cleared: the transaction is complete.
    AfterClear = 4,
    /// Halfway through installation, at log entry `n / 2`.
    MidInstall = 5,
}

impl FaultPoint {
    /// Every fault point, in commit order.
    pub const ALL: [FaultPoint; 5] = [
        FaultPoint::BeforeHeader,
        FaultPoint::AfterHeader,
        FaultPoint::MidInstall,
        FaultPoint::AfterInstall,
        FaultPoint::AfterClear,
    ];

    /// The stable number of this point.
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Whether a crash here leaves the commit point durable.
    ///
    /// These are the windows recovery rolls back.
    pub fn after_commit_point(self) -> bool {
        !matches!(self, FaultPoint::BeforeHeader | FaultPoint::AfterClear)
    }

    fn name(self) -> &'static str {
        match self {
            FaultPoint::BeforeHeader => "before-header",
            FaultPoint::AfterHeader => "after-header",
            FaultPoint::AfterInstall => "after-install",
            FaultPoint::AfterClear => "after-clear",
            FaultPoint::MidInstall => "mid-install",
        }
    }
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FaultPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        FaultPoint::ALL
            .into_iter()
            .find(|p| s == p.name() || s.parse::<u8>().ok() == Some(p.number()))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown fault point {:?}", s)))
    }
}

/// Abort with `InjectedFault` if `armed` is the point just reached.
pub(crate) fn trip(armed: Option<FaultPoint>, at: FaultPoint) -> Result<()> {
    if armed == Some(at) {
        log::warn!(
            "[UNDOLOG] injected fault in commit: {} ({}), {}",
            at,
            at.number(),
            if at.after_commit_point() {
                "recovery will roll back"
            } else {
                "nothing to recover"
            }
        );
        return Err(Error::InjectedFault(at));
    }
    Ok(())
}
