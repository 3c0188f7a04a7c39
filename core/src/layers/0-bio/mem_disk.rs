use super::block_store::check_range;
use crate::os::HashMap;
use crate::prelude::*;

/// A `BlockStore` kept in memory.
///
/// Blocks are allocated lazily on their first write, so a large but sparsely
/// used disk stays cheap. Unallocated blocks read as zeros.
pub struct MemDisk {
    blocks: Mutex<HashMap<BlockId, Box<[u8]>>>,
    super_block: Mutex<Box<[u8]>>,
    nblocks: usize,
    block_size: usize,
}

impl MemDisk {
    /// Creates a zeroed disk of `nblocks` blocks of `block_size` bytes each,
    /// with a superblock of `super_block_size` bytes.
    pub fn create(nblocks: usize, block_size: usize, super_block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return_errno_with_msg!(InvalidArgs, "block size must be greater than 0");
        }
        Ok(Self {
            blocks: Mutex::new(HashMap::new()),
            super_block: Mutex::new(vec![0u8; super_block_size].into_boxed_slice()),
            nblocks,
            block_size,
        })
    }

    /// Returns the number of blocks that hold memory.
    pub fn nallocated(&self) -> usize {
        self.blocks.lock().len()
    }

    fn check_pos(&self, pos: BlockId) -> Result<()> {
        if pos >= self.nblocks {
            return_errno_with_msg!(OutOfRange, "block position exceeds the disk");
        }
        Ok(())
    }
}

impl BlockStore for MemDisk {
    fn format(&self) -> Result<()> {
        self.blocks.lock().clear();
        self.super_block.lock().fill(0);
        debug!("[MemDisk] Formatted {} blocks", self.nblocks);
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn super_block_size(&self) -> usize {
        self.super_block.lock().len()
    }

    fn nblocks(&self) -> usize {
        self.nblocks
    }

    fn read_super_block(&self, buf: &mut [u8], block_offset: usize) -> Result<()> {
        let super_block = self.super_block.lock();
        check_range(block_offset, buf.len(), super_block.len())?;
        buf.copy_from_slice(&super_block[block_offset..block_offset + buf.len()]);
        Ok(())
    }

    fn write_super_block(&self, buf: &[u8], block_offset: usize) -> Result<()> {
        let mut super_block = self.super_block.lock();
        check_range(block_offset, buf.len(), super_block.len())?;
        super_block[block_offset..block_offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn read_block(&self, pos: BlockId, buf: &mut [u8], block_offset: usize) -> Result<()> {
        self.check_pos(pos)?;
        check_range(block_offset, buf.len(), self.block_size)?;

        match self.blocks.lock().get(&pos) {
            Some(block) => buf.copy_from_slice(&block[block_offset..block_offset + buf.len()]),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, pos: BlockId, buf: &[u8], block_offset: usize) -> Result<()> {
        self.check_pos(pos)?;
        check_range(block_offset, buf.len(), self.block_size)?;

        let block_size = self.block_size;
        let mut blocks = self.blocks.lock();
        let block = blocks
            .entry(pos)
            .or_insert_with(|| vec![0u8; block_size].into_boxed_slice());
        block[block_offset..block_offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl Debug for MemDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemDisk")
            .field("nblocks", &self.nblocks)
            .field("block_size", &self.block_size)
            .field("nallocated", &self.nallocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_disk_fns() -> Result<()> {
        let disk = MemDisk::create(16, 64, 256)?;
        assert_eq!(disk.nblocks(), 16);
        assert_eq!(disk.block_size(), 64);
        assert_eq!(disk.super_block_size(), 256);

        let mut rbuf = [0xffu8; 64];
        disk.read_block(3, &mut rbuf, 0)?;
        assert_eq!(rbuf, [0u8; 64]);
        assert_eq!(disk.nallocated(), 0);

        disk.write_block(3, &[7u8; 10], 20)?;
        disk.read_block(3, &mut rbuf, 0)?;
        assert_eq!(&rbuf[..20], &[0u8; 20]);
        assert_eq!(&rbuf[20..30], &[7u8; 10]);
        assert_eq!(&rbuf[30..], &[0u8; 34]);

        disk.write_super_block(b"root", 100)?;
        let mut sbuf = [0u8; 4];
        disk.read_super_block(&mut sbuf, 100)?;
        assert_eq!(&sbuf, b"root");

        disk.format()?;
        disk.read_block(3, &mut rbuf, 0)?;
        assert_eq!(rbuf, [0u8; 64]);
        disk.read_super_block(&mut sbuf, 100)?;
        assert_eq!(sbuf, [0u8; 4]);
        Ok(())
    }

    #[test]
    fn mem_disk_bounds() -> Result<()> {
        let disk = MemDisk::create(4, 32, 16)?;
        let mut buf = [0u8; 8];
        assert_eq!(
            disk.read_block(4, &mut buf, 0).unwrap_err().errno(),
            OutOfRange
        );
        assert_eq!(
            disk.write_block(0, &buf, 25).unwrap_err().errno(),
            OutOfRange
        );
        assert_eq!(
            disk.read_super_block(&mut buf, 9).unwrap_err().errno(),
            OutOfRange
        );
        Ok(())
    }
}
