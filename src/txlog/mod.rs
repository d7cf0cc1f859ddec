//! Transaction log - crash-atomic batches of block writes.
//!
//! # Components
//! - [`Log`] - The undo-log protocol: log writes, commit, recovery
//! - [`LogHeader`] - The on-disk header block
//! - [`FaultPoint`] - Deterministic crash windows inside commit
//!
//! # On-disk layout
//! ```text
//! ┌──────────┬─────────────┬─────────────┬─────┬──────────────────┐
//! │  header  │ pre-image 0 │ pre-image 1 │ ... │ pre-image size-2 │
//! └──────────┴─────────────┴─────────────┴─────┴──────────────────┘
//!   start      start+1       start+2             start+size-1
//! ```

mod fault;
mod header;
mod undo_log;

pub use fault::FaultPoint;
pub use header::LogHeader;
pub use undo_log::Log;
