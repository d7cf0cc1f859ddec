//! Storage layer - block devices and on-disk formats.
//!
//! This module handles persistent storage:
//! - [`Block`] - One block's worth of bytes
//! - [`BlockDevice`] - The synchronous device contract
//! - [`MemDisk`] / [`FileDisk`] - In-memory and file-backed devices
//! - [`superblock`] - The file-system layout, including the log region

mod block;
mod device;
mod file_disk;
mod mem_disk;
pub mod superblock;

pub use block::Block;
pub use device::BlockDevice;
pub use file_disk::FileDisk;
pub use mem_disk::MemDisk;
pub use superblock::{mkfs, read_superblock, Superblock};
