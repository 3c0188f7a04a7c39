use super::block_store::check_range;
use crate::prelude::*;

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// A `BlockStore` backed by a regular file.
///
/// The file holds the superblock first, followed by the blocks in order.
/// The file grows on demand; bytes past its end read as zeros.
/// The geometry is not recorded in the file, so the same values must be
/// given when it is opened again.
pub struct FileDisk {
    file: File,
    nblocks: usize,
    block_size: usize,
    super_block_size: usize,
}

impl FileDisk {
    /// Creates (or truncates) the file at `path`.
    pub fn create(
        path: impl AsRef<Path>,
        nblocks: usize,
        block_size: usize,
        super_block_size: usize,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::new(file, nblocks, block_size, super_block_size)
    }

    /// Opens an existing file at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        nblocks: usize,
        block_size: usize,
        super_block_size: usize,
    ) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::new(file, nblocks, block_size, super_block_size)
    }

    fn new(file: File, nblocks: usize, block_size: usize, super_block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return_errno_with_msg!(InvalidArgs, "block size must be greater than 0");
        }
        if nblocks
            .checked_mul(block_size)
            .and_then(|bytes| bytes.checked_add(super_block_size))
            .is_none()
        {
            return_errno_with_msg!(InvalidArgs, "disk geometry overflows");
        }
        Ok(Self {
            file,
            nblocks,
            block_size,
            super_block_size,
        })
    }

    fn block_pos_offset(&self, pos: BlockId) -> Result<u64> {
        if pos >= self.nblocks {
            return_errno_with_msg!(OutOfRange, "block position exceeds the disk");
        }
        Ok((self.super_block_size + pos * self.block_size) as u64)
    }

    fn read_zero_filled(&self, mut buf: &mut [u8], mut offset: u64) -> Result<()> {
        while !buf.is_empty() {
            match self.file.read_at(buf, offset) {
                // Past the end of file
                Ok(0) => {
                    buf.fill(0);
                    break;
                }
                Ok(nbytes) => {
                    let tmp = buf;
                    buf = &mut tmp[nbytes..];
                    offset += nbytes as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl BlockStore for FileDisk {
    fn format(&self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        debug!("[FileDisk] Formatted {} blocks", self.nblocks);
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn super_block_size(&self) -> usize {
        self.super_block_size
    }

    fn nblocks(&self) -> usize {
        self.nblocks
    }

    fn read_super_block(&self, buf: &mut [u8], block_offset: usize) -> Result<()> {
        check_range(block_offset, buf.len(), self.super_block_size)?;
        self.read_zero_filled(buf, block_offset as u64)
    }

    fn write_super_block(&self, buf: &[u8], block_offset: usize) -> Result<()> {
        check_range(block_offset, buf.len(), self.super_block_size)?;
        self.file.write_all_at(buf, block_offset as u64)?;
        Ok(())
    }

    fn read_block(&self, pos: BlockId, buf: &mut [u8], block_offset: usize) -> Result<()> {
        let base = self.block_pos_offset(pos)?;
        check_range(block_offset, buf.len(), self.block_size)?;
        self.read_zero_filled(buf, base + block_offset as u64)
    }

    fn write_block(&self, pos: BlockId, buf: &[u8], block_offset: usize) -> Result<()> {
        let base = self.block_pos_offset(pos)?;
        check_range(block_offset, buf.len(), self.block_size)?;
        self.file.write_all_at(buf, base + block_offset as u64)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
