//! Recycling order for buffer slots.
//!
//! Currently implements:
//! - [`MruList`] - Least-recently-released-first, with MRU-first lookup

mod mru;

pub use mru::MruList;
