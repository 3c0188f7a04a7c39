//! A Merkle tree laid over the flat block address space.
//!
//! The tree is implicit: block `i` is the parent of `2i+1` and `2i+2`, and
//! block 0 is the root. Each node hash covers the node's own ciphertext and
//! counter plus both children's hashes:
//!
//! ```text
//! hash(i) = PRF(ciphertext(i) || counter(i) || hash(2i+1) || hash(2i+2))
//! ```
//!
//! A child past the end of the device has an all-zero hash. A computed hash
//! that equals the hash of a fully empty node is stored as all-zero, so that
//! untouched subtrees look exactly like a freshly formatted device and the
//! root hash of an empty tree is zero.
use crate::os::{Hash, Prf, PrfKey};
use crate::prelude::*;

use core::mem::size_of;

const HASH_OFFSET: usize = 0;
const COUNTER_OFFSET: usize = HASH_OFFSET + Hash::SIZE;
const COUNTER_SIZE: usize = size_of::<u64>();
const PAYLOAD_OFFSET: usize = COUNTER_OFFSET + COUNTER_SIZE;

/// The number of bytes of each raw block taken by the hash and the counter.
pub const BLOCK_OVERHEAD: usize = PAYLOAD_OFFSET;

/// One node of the tree, as stored in a raw block.
pub(super) struct Node {
    pub hash: Hash,
    pub counter: u64,
    pub payload: Box<[u8]>,
}

impl Node {
    /// A node that is about to be committed by a write.
    pub fn new(counter: u64, payload: Box<[u8]>) -> Self {
        Self {
            hash: Hash::default(),
            counter,
            payload,
        }
    }

    fn decode(raw: &[u8]) -> Self {
        let hash = Hash::from_prefix(&raw[HASH_OFFSET..]);
        let mut counter_bytes = [0u8; COUNTER_SIZE];
        counter_bytes.copy_from_slice(&raw[COUNTER_OFFSET..PAYLOAD_OFFSET]);
        Self {
            hash,
            counter: u64::from_be_bytes(counter_bytes),
            payload: raw[PAYLOAD_OFFSET..].into(),
        }
    }

    /// Whether the payload is the never-written sentinel (all zeros).
    pub fn is_empty_payload(&self) -> bool {
        self.payload.iter().all(|byte| *byte == 0)
    }
}

pub(super) fn parent(pos: BlockId) -> Option<BlockId> {
    if pos == 0 {
        None
    } else {
        Some((pos - 1) / 2)
    }
}

pub(super) fn children(pos: BlockId) -> (BlockId, BlockId) {
    let left = pos.saturating_mul(2).saturating_add(1);
    (left, left.saturating_add(1))
}

/// A view of the Merkle tree on a raw device under one tree hash key.
pub(super) struct MerkleTree<'a, D> {
    dev: &'a D,
    key: &'a PrfKey,
    empty_hash: Hash,
}

impl<'a, D: BlockStore> MerkleTree<'a, D> {
    pub fn new(dev: &'a D, key: &'a PrfKey) -> Result<Self> {
        let empty_payload = vec![0u8; dev.block_size() - BLOCK_OVERHEAD];
        let empty_hash = digest(key, &empty_payload, 0, &Hash::default(), &Hash::default())?;
        Ok(Self {
            dev,
            key,
            empty_hash,
        })
    }

    /// Verifies the path from block `pos` up to the root against
    /// `root_hash`, then returns the node of `pos`.
    ///
    /// Every stored hash on the path must agree with the hash recomputed from
    /// the on-device content. The only tolerated disagreement is a stored raw
    /// empty-node digest where the canonical zero is expected; such hashes
    /// are rewritten as zero, but only after the whole path has been checked
    /// against the trusted root. The superblock is never touched.
    pub fn verify_path(&self, pos: BlockId, root_hash: &Hash) -> Result<Node> {
        let leaf = self.read_node(pos)?;
        let mut stale = Vec::new();

        let mut curr_pos = pos;
        let mut curr_hash = self.verify_node(pos, &leaf, None, &mut stale)?;
        while let Some(parent_pos) = parent(curr_pos) {
            let node = self.read_node(parent_pos)?;
            curr_hash =
                self.verify_node(parent_pos, &node, Some((curr_pos, &curr_hash)), &mut stale)?;
            curr_pos = parent_pos;
        }

        if !curr_hash.ct_eq(root_hash) {
            warn!(
                "[MerkleTree] Root hash mismatch while verifying block {}",
                pos
            );
            return_errno_with_msg!(IntegrityViolation, "root hash mismatch");
        }

        for stale_pos in stale {
            trace!("[MerkleTree] Normalize the empty hash of block {}", stale_pos);
            self.write_hash(stale_pos, &Hash::default())?;
        }
        Ok(leaf)
    }

    /// Persists the counter and payload of `leaf` at `pos`, then recomputes
    /// and persists every hash from `pos` up to the root.
    ///
    /// Returns the new root hash, which the caller must commit to the
    /// superblock for the write to take effect.
    pub fn commit_path(&self, pos: BlockId, leaf: &Node) -> Result<Hash> {
        let mut raw = Vec::with_capacity(COUNTER_SIZE + leaf.payload.len());
        raw.extend_from_slice(&leaf.counter.to_be_bytes());
        raw.extend_from_slice(&leaf.payload);
        self.dev.write_block(pos, &raw, COUNTER_OFFSET)?;

        let (left, right) = self.child_hashes(pos, None)?;
        let mut curr_hash = self.node_hash(&leaf.payload, leaf.counter, &left, &right)?;
        self.write_hash(pos, &curr_hash)?;

        let mut curr_pos = pos;
        while let Some(parent_pos) = parent(curr_pos) {
            let node = self.read_node(parent_pos)?;
            let (left, right) = self.child_hashes(parent_pos, Some((curr_pos, &curr_hash)))?;
            curr_hash = self.node_hash(&node.payload, node.counter, &left, &right)?;
            self.write_hash(parent_pos, &curr_hash)?;
            curr_pos = parent_pos;
        }
        Ok(curr_hash)
    }

    fn verify_node(
        &self,
        pos: BlockId,
        node: &Node,
        on_path: Option<(BlockId, &Hash)>,
        stale: &mut Vec<BlockId>,
    ) -> Result<Hash> {
        let (left, right) = self.child_hashes(pos, on_path)?;
        let hash = self.node_hash(&node.payload, node.counter, &left, &right)?;
        if !node.hash.ct_eq(&hash) {
            if hash.is_zero() && node.hash.ct_eq(&self.empty_hash) {
                stale.push(pos);
            } else {
                warn!("[MerkleTree] Stored hash of block {} is inconsistent", pos);
                return_errno_with_msg!(IntegrityViolation, "node hash mismatch");
            }
        }
        Ok(hash)
    }

    /// Returns the hashes of both children of `pos`. The hash of the child
    /// on the path being walked is taken from `on_path` instead of the device.
    fn child_hashes(&self, pos: BlockId, on_path: Option<(BlockId, &Hash)>) -> Result<(Hash, Hash)> {
        let hash_of = |child: BlockId| match on_path {
            Some((path_pos, path_hash)) if path_pos == child => Ok(*path_hash),
            _ => self.stored_hash(child),
        };
        let (left, right) = children(pos);
        Ok((hash_of(left)?, hash_of(right)?))
    }

    fn node_hash(&self, payload: &[u8], counter: u64, left: &Hash, right: &Hash) -> Result<Hash> {
        let hash = digest(self.key, payload, counter, left, right)?;
        if hash.ct_eq(&self.empty_hash) {
            return Ok(Hash::default());
        }
        Ok(hash)
    }

    fn read_node(&self, pos: BlockId) -> Result<Node> {
        let mut raw = vec![0u8; self.dev.block_size()];
        self.dev.read_block(pos, &mut raw, 0)?;
        Ok(Node::decode(&raw))
    }

    fn stored_hash(&self, pos: BlockId) -> Result<Hash> {
        let mut hash = Hash::default();
        if pos < self.dev.nblocks() {
            self.dev.read_block(pos, &mut hash, HASH_OFFSET)?;
        }
        Ok(hash)
    }

    fn write_hash(&self, pos: BlockId, hash: &Hash) -> Result<()> {
        self.dev.write_block(pos, hash, HASH_OFFSET)
    }
}

fn digest(key: &PrfKey, payload: &[u8], counter: u64, left: &Hash, right: &Hash) -> Result<Hash> {
    let mut prf = Prf::new(key)?;
    prf.update(payload)?;
    prf.update(&counter.to_be_bytes())?;
    prf.update(left)?;
    prf.update(right)?;
    prf.finalize()
}
