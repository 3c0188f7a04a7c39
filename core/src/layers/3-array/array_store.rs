use crate::layers::bio::check_range;
use crate::prelude::*;

/// A flat byte array laid over the blocks of a `BlockStore`, in block order.
///
/// Byte `n` of the array is byte `n % block_size` of block `n / block_size`.
pub struct ArrayStore<S> {
    store: S,
}

impl<S: BlockStore> ArrayStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the number of bytes the array can hold, saturated at
    /// `usize::MAX`.
    pub fn capacity(&self) -> usize {
        self.store.nblocks().saturating_mul(self.store.block_size())
    }

    /// Read `buf.len()` bytes starting at byte `array_offset`.
    pub fn read(&self, buf: &mut [u8], array_offset: usize) -> Result<()> {
        check_range(array_offset, buf.len(), self.capacity())?;

        let mut done = 0;
        while done < buf.len() {
            let (pos, block_offset, len) = self.locate(array_offset + done, buf.len() - done);
            self.store
                .read_block(pos, &mut buf[done..done + len], block_offset)?;
            done += len;
        }
        Ok(())
    }

    /// Write `buf` starting at byte `array_offset`.
    ///
    /// A write spanning several blocks is not atomic: a failure midway
    /// leaves the leading blocks updated.
    pub fn write(&self, buf: &[u8], array_offset: usize) -> Result<()> {
        check_range(array_offset, buf.len(), self.capacity())?;

        let mut done = 0;
        while done < buf.len() {
            let (pos, block_offset, len) = self.locate(array_offset + done, buf.len() - done);
            self.store
                .write_block(pos, &buf[done..done + len], block_offset)?;
            done += len;
        }
        Ok(())
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Maps an array offset to a block, the offset within it and the number
    /// of the remaining bytes that fit in that block.
    fn locate(&self, offset: usize, remaining: usize) -> (BlockId, usize, usize) {
        let block_size = self.store.block_size();
        let block_offset = offset % block_size;
        (
            offset / block_size,
            block_offset,
            remaining.min(block_size - block_offset),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::bio::MemDisk;
    use crate::layers::crypto::AuthEncStore;

    #[test]
    fn array_store_fns() -> Result<()> {
        let array = ArrayStore::new(MemDisk::create(4, 16, 0)?);
        assert_eq!(array.capacity(), 64);

        let data: Vec<u8> = (0..40).collect();
        array.write(&data, 10)?;

        let mut buf = vec![0u8; 40];
        array.read(&mut buf, 10)?;
        assert_eq!(buf, data);

        // Block 1 holds array bytes 16..32
        let mut block = [0u8; 16];
        array.inner().read_block(1, &mut block, 0)?;
        assert_eq!(&block[..], &data[6..22]);

        let mut head = [0xffu8; 10];
        array.read(&mut head, 0)?;
        assert_eq!(head, [0u8; 10]);
        Ok(())
    }

    #[test]
    fn array_store_bounds() -> Result<()> {
        let array = ArrayStore::new(MemDisk::create(4, 16, 0)?);
        let mut buf = [0u8; 8];
        array.read(&mut buf, 56)?;
        assert_eq!(array.read(&mut buf, 57).unwrap_err().errno(), OutOfRange);
        assert_eq!(array.write(&buf, usize::MAX).unwrap_err().errno(), OutOfRange);
        array.write(&[], 64)?;
        Ok(())
    }

    #[test]
    fn huge_array_capacity() -> Result<()> {
        let array = ArrayStore::new(MemDisk::create(usize::MAX, 16, 0)?);
        assert_eq!(array.capacity(), usize::MAX);

        let tail = usize::MAX - 8;
        array.write(&[0x5au8; 4], tail)?;
        let mut buf = [0xffu8; 8];
        array.read(&mut buf, tail)?;
        assert_eq!(buf, [0x5a, 0x5a, 0x5a, 0x5a, 0, 0, 0, 0]);
        assert_eq!(array.read(&mut buf, tail + 1).unwrap_err().errno(), OutOfRange);
        Ok(())
    }

    #[test]
    fn array_over_auth_enc_store() -> Result<()> {
        let store = AuthEncStore::create(MemDisk::create(8, 64, 128)?)?;
        let array = ArrayStore::new(store);
        assert_eq!(array.capacity(), 8 * 24);

        let data = [0x77u8; 100];
        array.write(&data, 30)?;
        let mut buf = [0u8; 100];
        array.read(&mut buf, 30)?;
        assert_eq!(buf, data);
        Ok(())
    }
}
