//! Root secrets and the root hash, kept at the head of the raw superblock.
use crate::os::{Hash, Prf, PrfKey, SkcipherIv, SkcipherKey};
use crate::prelude::*;

use pod::Pod;
use static_assertions::assert_eq_size;

/// The number of bytes reserved at the head of the raw superblock.
pub const SUPER_BLOCK_RESERVED: usize = 4 * Hash::SIZE;

const ROOT_HASH_OFFSET: usize = 2 * PrfKey::SIZE;

/// The reserved head of the superblock.
///
/// All secrets are minted together by `format` and never change afterwards;
/// only `root_hash` is rewritten, once per block write.
#[repr(C)]
#[derive(Clone, Copy, Pod, Debug)]
pub(super) struct SuperBlock {
    /// Derives one encryption key per block index.
    key_of_keys: PrfKey,
    /// Derives one nonce per write counter value.
    key_of_nonces: PrfKey,
    /// The expected hash of block 0.
    root_hash: Hash,
    /// Keys the Merkle tree hash.
    tree_hash_key: PrfKey,
}

assert_eq_size!(SuperBlock, [u8; SUPER_BLOCK_RESERVED]);

impl SuperBlock {
    /// Mints fresh secrets. The root hash of an empty tree is all-zero.
    pub fn mint() -> Result<Self> {
        Ok(Self {
            key_of_keys: PrfKey::random()?,
            key_of_nonces: PrfKey::random()?,
            root_hash: Hash::default(),
            tree_hash_key: PrfKey::random()?,
        })
    }

    pub fn load<D: BlockStore>(dev: &D) -> Result<Self> {
        let mut bytes = [0u8; SUPER_BLOCK_RESERVED];
        dev.read_super_block(&mut bytes, 0)?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn store<D: BlockStore>(&self, dev: &D) -> Result<()> {
        dev.write_super_block(self.as_bytes(), 0)
    }

    /// Overwrites the root hash only. This is the commit point of a write.
    pub fn store_root_hash<D: BlockStore>(dev: &D, root_hash: &Hash) -> Result<()> {
        dev.write_super_block(root_hash, ROOT_HASH_OFFSET)
    }

    /// Whether the secrets were ever minted. A never-formatted device reads
    /// back all zeros.
    pub fn is_formatted(&self) -> bool {
        !(self.key_of_keys.is_zero()
            && self.key_of_nonces.is_zero()
            && self.tree_hash_key.is_zero())
    }

    pub fn root_hash(&self) -> &Hash {
        &self.root_hash
    }

    pub fn tree_hash_key(&self) -> &PrfKey {
        &self.tree_hash_key
    }

    /// Derives the encryption key of block `pos` from its 4-byte big-endian
    /// index.
    pub fn block_key(&self, pos: BlockId) -> Result<SkcipherKey> {
        let index = u32::try_from(pos)
            .map_err(|_| Error::with_msg(OutOfRange, "block position exceeds 32 bits"))?;
        let digest = Prf::eval(&self.key_of_keys, &index.to_be_bytes())?;
        Ok(SkcipherKey::from_prefix(&digest))
    }

    /// Derives the nonce for a block whose write counter is `counter`.
    pub fn nonce(&self, counter: u64) -> Result<SkcipherIv> {
        let digest = Prf::eval(&self.key_of_nonces, &counter.to_be_bytes())?;
        Ok(SkcipherIv::from_prefix(&digest))
    }
}
