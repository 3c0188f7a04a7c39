use crate::layers::bio::check_range;
use crate::prelude::*;

use core::mem::size_of;

const COUNT_SIZE: usize = size_of::<u64>();

/// Hands out interleaved sub-stores of one base `BlockStore`.
///
/// The multiplexor expects a freshly formatted base when it is created, so
/// that every new sub-store starts out reading as zeros.
pub struct BlockStoreMultiplexor<D> {
    base: Arc<D>,
    max_sub_stores: usize,
    num_sub_stores: Mutex<usize>,
}

impl<D: BlockStore> BlockStoreMultiplexor<D> {
    /// Creates a multiplexor with no sub-stores over `base`.
    pub fn create(base: D, max_sub_stores: usize) -> Result<Self> {
        let multiplexor = Self::new(base, max_sub_stores, 0)?;
        multiplexor.store_count(0)?;
        debug!(
            "[Multiplexor] Created with room for {} sub-stores",
            max_sub_stores
        );
        Ok(multiplexor)
    }

    /// Opens the multiplexor persisted in `base`.
    pub fn open(base: D, max_sub_stores: usize) -> Result<Self> {
        let mut count_bytes = [0u8; COUNT_SIZE];
        base.read_super_block(&mut count_bytes, 0)?;
        let count = usize::try_from(u64::from_be_bytes(count_bytes))
            .map_err(|_| Error::with_msg(InvalidArgs, "corrupted sub-store count"))?;
        if count > max_sub_stores {
            return_errno_with_msg!(InvalidArgs, "corrupted sub-store count");
        }

        let multiplexor = Self::new(base, max_sub_stores, count)?;
        debug!("[Multiplexor] Opened with {} sub-stores", count);
        Ok(multiplexor)
    }

    fn new(base: D, max_sub_stores: usize, count: usize) -> Result<Self> {
        if max_sub_stores == 0 {
            return_errno_with_msg!(InvalidArgs, "a multiplexor needs room for one sub-store");
        }
        if base.super_block_size() < COUNT_SIZE {
            return_errno_with_msg!(InvalidArgs, "base superblock too small");
        }
        Ok(Self {
            base: Arc::new(base),
            max_sub_stores,
            num_sub_stores: Mutex::new(count),
        })
    }

    /// Allocates the next sub-store.
    pub fn new_sub_store(&self) -> Result<SubStore<D>> {
        let mut count = self.num_sub_stores.lock();
        if *count >= self.max_sub_stores {
            return_errno_with_msg!(OutOfDisk, "no sub-store left");
        }
        self.store_count(*count + 1)?;
        *count += 1;
        debug!("[Multiplexor] Allocated sub-store {}", *count - 1);
        Ok(self.sub_store(*count - 1))
    }

    /// Returns the already allocated sub-store `index`.
    pub fn get_sub_store(&self, index: usize) -> Result<SubStore<D>> {
        if index >= *self.num_sub_stores.lock() {
            return_errno_with_msg!(NotFound, "sub-store not allocated");
        }
        Ok(self.sub_store(index))
    }

    pub fn num_sub_stores(&self) -> usize {
        *self.num_sub_stores.lock()
    }

    pub fn max_sub_stores(&self) -> usize {
        self.max_sub_stores
    }

    fn sub_store(&self, index: usize) -> SubStore<D> {
        SubStore {
            base: self.base.clone(),
            index,
            max_sub_stores: self.max_sub_stores,
        }
    }

    fn store_count(&self, count: usize) -> Result<()> {
        self.base
            .write_super_block(&(count as u64).to_be_bytes(), 0)
    }
}

/// One interleaved view of the base store of a `BlockStoreMultiplexor`.
pub struct SubStore<D> {
    base: Arc<D>,
    index: usize,
    max_sub_stores: usize,
}

impl<D: BlockStore> SubStore<D> {
    /// Returns the index of this sub-store within its multiplexor.
    pub fn index(&self) -> usize {
        self.index
    }

    fn base_pos(&self, pos: BlockId) -> Result<BlockId> {
        if pos >= self.nblocks() {
            return_errno_with_msg!(OutOfRange, "block position exceeds the sub-store");
        }
        Ok(pos * self.max_sub_stores + self.index)
    }

    fn super_block_offset(&self, block_offset: usize, len: usize) -> Result<usize> {
        let slice_size = self.super_block_size();
        check_range(block_offset, len, slice_size)?;
        Ok(COUNT_SIZE + self.index * slice_size + block_offset)
    }
}

impl<D> Clone for SubStore<D> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            index: self.index,
            max_sub_stores: self.max_sub_stores,
        }
    }
}

impl<D: BlockStore> BlockStore for SubStore<D> {
    /// Zero-fills every block and the superblock slice of this sub-store only.
    fn format(&self) -> Result<()> {
        let zeros = vec![0u8; self.block_size()];
        for pos in 0..self.nblocks() {
            self.write_block(pos, &zeros, 0)?;
        }
        let zeros = vec![0u8; self.super_block_size()];
        self.write_super_block(&zeros, 0)?;
        debug!("[SubStore] Formatted sub-store {}", self.index);
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.base.block_size()
    }

    fn super_block_size(&self) -> usize {
        (self.base.super_block_size() - COUNT_SIZE) / self.max_sub_stores
    }

    fn nblocks(&self) -> usize {
        self.base.nblocks() / self.max_sub_stores
    }

    fn read_super_block(&self, buf: &mut [u8], block_offset: usize) -> Result<()> {
        let offset = self.super_block_offset(block_offset, buf.len())?;
        self.base.read_super_block(buf, offset)
    }

    fn write_super_block(&self, buf: &[u8], block_offset: usize) -> Result<()> {
        let offset = self.super_block_offset(block_offset, buf.len())?;
        self.base.write_super_block(buf, offset)
    }

    fn read_block(&self, pos: BlockId, buf: &mut [u8], block_offset: usize) -> Result<()> {
        let base_pos = self.base_pos(pos)?;
        self.base.read_block(base_pos, buf, block_offset)
    }

    fn write_block(&self, pos: BlockId, buf: &[u8], block_offset: usize) -> Result<()> {
        let base_pos = self.base_pos(pos)?;
        self.base.write_block(base_pos, buf, block_offset)
    }

    fn flush(&self) -> Result<()> {
        self.base.flush()
    }
}

impl<D> Debug for SubStore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubStore")
            .field("index", &self.index)
            .field("max_sub_stores", &self.max_sub_stores)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::bio::MemDisk;
    use crate::layers::crypto::AuthEncStore;

    #[test]
    fn sub_store_geometry() -> Result<()> {
        let base = MemDisk::create(13, 32, COUNT_SIZE + 3 * 16 + 5)?;
        let multiplexor = BlockStoreMultiplexor::create(base, 3)?;
        let sub_store = multiplexor.new_sub_store()?;

        assert_eq!(sub_store.nblocks(), 4);
        assert_eq!(sub_store.block_size(), 32);
        assert_eq!(sub_store.super_block_size(), 17);
        Ok(())
    }

    #[test]
    fn sub_stores_are_isolated() -> Result<()> {
        let base = MemDisk::create(12, 32, COUNT_SIZE + 3 * 16)?;
        let multiplexor = BlockStoreMultiplexor::create(base, 3)?;
        let first = multiplexor.new_sub_store()?;
        let second = multiplexor.new_sub_store()?;

        for pos in 0..4 {
            first.write_block(pos, &[1u8; 32], 0)?;
        }
        first.write_super_block(&[7u8; 16], 0)?;

        let mut buf = [0xffu8; 32];
        for pos in 0..4 {
            second.read_block(pos, &mut buf, 0)?;
            assert_eq!(buf, [0u8; 32]);
        }
        let mut sbuf = [0xffu8; 16];
        second.read_super_block(&mut sbuf, 0)?;
        assert_eq!(sbuf, [0u8; 16]);

        second.write_block(2, &[2u8; 32], 0)?;
        first.read_block(2, &mut buf, 0)?;
        assert_eq!(buf, [1u8; 32]);

        // Only the first sub-store is wiped
        first.format()?;
        first.read_block(2, &mut buf, 0)?;
        assert_eq!(buf, [0u8; 32]);
        first.read_super_block(&mut sbuf, 0)?;
        assert_eq!(sbuf, [0u8; 16]);
        second.read_block(2, &mut buf, 0)?;
        assert_eq!(buf, [2u8; 32]);

        assert_eq!(
            first.read_block(4, &mut buf, 0).unwrap_err().errno(),
            OutOfRange
        );
        assert_eq!(
            first.write_super_block(&[0u8; 2], 15).unwrap_err().errno(),
            OutOfRange
        );
        Ok(())
    }

    #[test]
    fn allocation() -> Result<()> {
        let base = MemDisk::create(8, 32, COUNT_SIZE + 2 * 8)?;
        let multiplexor = BlockStoreMultiplexor::create(base, 2)?;
        assert_eq!(multiplexor.max_sub_stores(), 2);
        assert_eq!(multiplexor.num_sub_stores(), 0);
        assert_eq!(
            multiplexor.get_sub_store(0).unwrap_err().errno(),
            NotFound
        );

        assert_eq!(multiplexor.new_sub_store()?.index(), 0);
        assert_eq!(multiplexor.new_sub_store()?.index(), 1);
        assert_eq!(
            multiplexor.new_sub_store().unwrap_err().errno(),
            OutOfDisk
        );
        assert_eq!(multiplexor.num_sub_stores(), 2);
        assert_eq!(multiplexor.get_sub_store(1)?.index(), 1);
        Ok(())
    }

    #[test]
    fn reopen_over_auth_enc_store() -> Result<()> {
        let disk = Arc::new(MemDisk::create(16, 72, 128 + COUNT_SIZE + 4 * 8)?);
        let base = AuthEncStore::create(disk.clone())?;
        let multiplexor = BlockStoreMultiplexor::create(base, 4)?;
        let sub_store = multiplexor.new_sub_store()?;
        multiplexor.new_sub_store()?;
        sub_store.write_block(3, b"persisted", 5)?;
        drop(sub_store);
        drop(multiplexor);

        let base = AuthEncStore::open(disk.clone())?;
        assert_eq!(
            BlockStoreMultiplexor::open(AuthEncStore::open(disk.clone())?, 1)
                .unwrap_err()
                .errno(),
            InvalidArgs
        );
        let multiplexor = BlockStoreMultiplexor::open(base, 4)?;
        assert_eq!(multiplexor.num_sub_stores(), 2);
        let mut buf = [0u8; 9];
        multiplexor
            .get_sub_store(0)?
            .read_block(3, &mut buf, 5)?;
        assert_eq!(&buf, b"persisted");
        Ok(())
    }
}
