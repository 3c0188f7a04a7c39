//! The layer of untrusted block I/O.
//!
//! A `BlockStore` is a fixed number of fixed-size blocks plus a small
//! superblock region, addressed at byte granularity within each block.
//! Nothing at this layer protects the data.

mod block_store;
mod file_disk;
mod mem_disk;

pub use self::block_store::{check_range, BlockStore};
pub use self::file_disk::FileDisk;
pub use self::mem_disk::MemDisk;

pub type BlockId = usize;
