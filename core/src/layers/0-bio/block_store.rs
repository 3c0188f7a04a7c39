use crate::prelude::*;

use inherit_methods_macro::inherit_methods;

/// A fixed set of fixed-size blocks plus a superblock region, supporting
/// random reads and writes at byte granularity.
///
/// A range of a block or of the superblock that has never been written reads
/// as zeros.
///
/// # Thread safety
///
/// `BlockStore` is a data structure of interior mutability.
/// Implementations promise the atomicity of each individual call, but
/// nothing across calls.
pub trait BlockStore: Sync + Send {
    /// Reinitialize the store, discarding all blocks and the superblock.
    fn format(&self) -> Result<()>;

    /// Returns the size of each block in bytes.
    fn block_size(&self) -> usize;

    /// Returns the size of the superblock region in bytes.
    fn super_block_size(&self) -> usize;

    /// Returns the number of blocks.
    fn nblocks(&self) -> usize;

    /// Read `buf.len()` bytes of the superblock, starting at `block_offset`.
    fn read_super_block(&self, buf: &mut [u8], block_offset: usize) -> Result<()>;

    /// Write `buf` into the superblock, starting at `block_offset`.
    fn write_super_block(&self, buf: &[u8], block_offset: usize) -> Result<()>;

    /// Read `buf.len()` bytes of block `pos`, starting at `block_offset`.
    fn read_block(&self, pos: BlockId, buf: &mut [u8], block_offset: usize) -> Result<()>;

    /// Write `buf` into block `pos`, starting at `block_offset`.
    fn write_block(&self, pos: BlockId, buf: &[u8], block_offset: usize) -> Result<()>;

    /// Ensure that blocks are persisted to the storage medium.
    fn flush(&self) -> Result<()>;
}

macro_rules! impl_block_store_pointer {
    ($typ:ty,$from:tt) => {
        #[inherit_methods(from = $from)]
        impl<T: BlockStore> BlockStore for $typ {
            fn format(&self) -> Result<()>;
            fn block_size(&self) -> usize;
            fn super_block_size(&self) -> usize;
            fn nblocks(&self) -> usize;
            fn read_super_block(&self, buf: &mut [u8], block_offset: usize) -> Result<()>;
            fn write_super_block(&self, buf: &[u8], block_offset: usize) -> Result<()>;
            fn read_block(&self, pos: BlockId, buf: &mut [u8], block_offset: usize) -> Result<()>;
            fn write_block(&self, pos: BlockId, buf: &[u8], block_offset: usize) -> Result<()>;
            fn flush(&self) -> Result<()>;
        }
    };
}

impl_block_store_pointer!(&T, "(**self)");
impl_block_store_pointer!(Box<T>, "(**self)");
impl_block_store_pointer!(Arc<T>, "(**self)");

/// Check that `[offset, offset + len)` lies within `[0, limit)`.
pub fn check_range(offset: usize, len: usize, limit: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= limit => Ok(()),
        _ => return_errno_with_msg!(OutOfRange, "byte range exceeds the region"),
    }
}
