//! Common types and utilities shared across the crate.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and runtime knobs
//! - Error types
//! - Identifiers (BlockId, BufId)

mod block_id;
mod buf_id;
pub mod config;
pub mod error;

pub use block_id::BlockId;
pub use buf_id::BufId;
pub use error::{Error, Result};
