use super::merkle::{MerkleTree, Node, BLOCK_OVERHEAD};
use super::super_block::{SuperBlock, SUPER_BLOCK_RESERVED};
use crate::layers::bio::check_range;
use crate::os::{Hash, Skcipher};
use crate::prelude::*;

/// A `BlockStore` that encrypts and authenticates every block of an
/// untrusted raw `BlockStore`.
///
/// Reads verify the whole Merkle path of a block against the root hash kept
/// in the superblock before anything is decrypted. Writes are
/// read-modify-write: the block is verified, patched, re-encrypted under a
/// fresh nonce, and every hash up to the root is recomputed. The new root
/// hash is written to the superblock last, which is the commit point.
///
/// Each logical block is `BLOCK_OVERHEAD` bytes smaller than a raw block and
/// the logical superblock is `SUPER_BLOCK_RESERVED` bytes smaller than the
/// raw one.
///
/// All operations on one store are serialized.
pub struct AuthEncStore<D> {
    dev: D,
    io_region: Mutex<()>,
}

impl<D: BlockStore> AuthEncStore<D> {
    /// Formats `dev` and builds a store over it with freshly minted secrets.
    pub fn create(dev: D) -> Result<Self> {
        let store = Self::new(dev)?;
        store.format()?;
        Ok(store)
    }

    /// Opens a store over a formatted `dev`, trusting its superblock.
    pub fn open(dev: D) -> Result<Self> {
        let store = Self::new(dev)?;
        store.load_formatted_super_block()?;
        debug!(
            "[AuthEncStore] Opened with {} blocks",
            store.dev.nblocks()
        );
        Ok(store)
    }

    /// Opens a store over a formatted `dev`, refusing to do so unless the
    /// root hash in its superblock equals `root_hash`.
    ///
    /// Rolling back the whole device, superblock included, is only detected
    /// this way.
    pub fn open_with_root(dev: D, root_hash: &Hash) -> Result<Self> {
        let store = Self::new(dev)?;
        let super_block = store.load_formatted_super_block()?;
        if !super_block.root_hash().ct_eq(root_hash) {
            warn!("[AuthEncStore] Root hash of the device is not the trusted one");
            return_errno_with_msg!(IntegrityViolation, "untrusted root hash");
        }
        debug!(
            "[AuthEncStore] Opened with {} blocks and a trusted root",
            store.dev.nblocks()
        );
        Ok(store)
    }

    fn new(dev: D) -> Result<Self> {
        if dev.block_size() <= BLOCK_OVERHEAD {
            return_errno_with_msg!(InvalidArgs, "raw block too small to hold a payload");
        }
        if dev.super_block_size() < SUPER_BLOCK_RESERVED {
            return_errno_with_msg!(InvalidArgs, "raw superblock too small");
        }
        if u32::try_from(dev.nblocks().saturating_sub(1)).is_err() {
            return_errno_with_msg!(InvalidArgs, "too many blocks to index with 32 bits");
        }
        Ok(Self {
            dev,
            io_region: Mutex::new(()),
        })
    }

    fn load_formatted_super_block(&self) -> Result<SuperBlock> {
        let super_block = SuperBlock::load(&self.dev)?;
        if !super_block.is_formatted() {
            warn!("[AuthEncStore] Refused to open a device that was never formatted");
            return_errno_with_msg!(NotFormatted, "device is not formatted");
        }
        Ok(super_block)
    }

    /// Returns the current root hash, for a trusted party to pin.
    pub fn root_hash(&self) -> Result<Hash> {
        let _guard = self.io_region.lock();
        let super_block = SuperBlock::load(&self.dev)?;
        Ok(*super_block.root_hash())
    }

    /// Returns the underlying raw device.
    pub fn inner(&self) -> &D {
        &self.dev
    }

    fn check_pos(&self, pos: BlockId) -> Result<()> {
        if pos >= self.dev.nblocks() {
            return_errno_with_msg!(OutOfRange, "block position exceeds the store");
        }
        Ok(())
    }

    /// Verifies block `pos` and returns its node along with the whole
    /// decrypted payload.
    fn fetch_plain(
        &self,
        tree: &MerkleTree<'_, D>,
        super_block: &SuperBlock,
        pos: BlockId,
    ) -> Result<(Node, Box<[u8]>)> {
        let node = tree.verify_path(pos, super_block.root_hash())?;
        let mut plain = vec![0u8; node.payload.len()].into_boxed_slice();
        // Never written
        if node.is_empty_payload() {
            return Ok((node, plain));
        }

        let key = super_block.block_key(pos)?;
        let iv = super_block.nonce(node.counter)?;
        Skcipher::new().decrypt(&node.payload, &key, &iv, &mut plain)?;
        Ok((node, plain))
    }
}

impl<D: BlockStore> BlockStore for AuthEncStore<D> {
    /// Wipes the device and mints new secrets. Everything previously stored
    /// becomes unreadable.
    fn format(&self) -> Result<()> {
        let _guard = self.io_region.lock();
        self.dev.format()?;
        SuperBlock::mint()?.store(&self.dev)?;
        debug!(
            "[AuthEncStore] Formatted {} blocks",
            self.dev.nblocks()
        );
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.dev.block_size() - BLOCK_OVERHEAD
    }

    fn super_block_size(&self) -> usize {
        self.dev.super_block_size() - SUPER_BLOCK_RESERVED
    }

    fn nblocks(&self) -> usize {
        self.dev.nblocks()
    }

    fn read_super_block(&self, buf: &mut [u8], block_offset: usize) -> Result<()> {
        check_range(block_offset, buf.len(), self.super_block_size())?;
        let _guard = self.io_region.lock();
        self.dev
            .read_super_block(buf, SUPER_BLOCK_RESERVED + block_offset)
    }

    fn write_super_block(&self, buf: &[u8], block_offset: usize) -> Result<()> {
        check_range(block_offset, buf.len(), self.super_block_size())?;
        let _guard = self.io_region.lock();
        self.dev
            .write_super_block(buf, SUPER_BLOCK_RESERVED + block_offset)
    }

    fn read_block(&self, pos: BlockId, buf: &mut [u8], block_offset: usize) -> Result<()> {
        self.check_pos(pos)?;
        check_range(block_offset, buf.len(), self.block_size())?;
        trace!(
            "[AuthEncStore] Read block {} at offset {}, len {}",
            pos,
            block_offset,
            buf.len()
        );

        let _guard = self.io_region.lock();
        let super_block = SuperBlock::load(&self.dev)?;
        let tree = MerkleTree::new(&self.dev, super_block.tree_hash_key())?;
        let (_, plain) = self.fetch_plain(&tree, &super_block, pos)?;
        buf.copy_from_slice(&plain[block_offset..block_offset + buf.len()]);
        Ok(())
    }

    fn write_block(&self, pos: BlockId, buf: &[u8], block_offset: usize) -> Result<()> {
        self.check_pos(pos)?;
        check_range(block_offset, buf.len(), self.block_size())?;
        trace!(
            "[AuthEncStore] Write block {} at offset {}, len {}",
            pos,
            block_offset,
            buf.len()
        );

        let _guard = self.io_region.lock();
        let super_block = SuperBlock::load(&self.dev)?;
        let tree = MerkleTree::new(&self.dev, super_block.tree_hash_key())?;
        let (node, mut plain) = self.fetch_plain(&tree, &super_block, pos)?;
        plain[block_offset..block_offset + buf.len()].copy_from_slice(buf);

        let counter = node
            .counter
            .checked_add(1)
            .ok_or(Error::with_msg(NonceExhausted, "block counter overflows"))?;
        let key = super_block.block_key(pos)?;
        let iv = super_block.nonce(counter)?;
        let mut cipher = vec![0u8; plain.len()].into_boxed_slice();
        Skcipher::new().encrypt(&plain, &key, &iv, &mut cipher)?;

        let root_hash = tree.commit_path(pos, &Node::new(counter, cipher))?;
        SuperBlock::store_root_hash(&self.dev, &root_hash)
    }

    fn flush(&self) -> Result<()> {
        let _guard = self.io_region.lock();
        self.dev.flush()
    }
}

impl<D: BlockStore> Debug for AuthEncStore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthEncStore")
            .field("nblocks", &self.nblocks())
            .field("block_size", &self.block_size())
            .finish()
    }
}
