//! The layer of authenticated encryption.
//!
//! `AuthEncStore` turns an untrusted `BlockStore` into one that guarantees
//! confidentiality and integrity (including freshness) of every block.
//!
//! # On-disk format
//!
//! Each raw block holds one node of a Merkle tree laid over the block
//! address space (block `i` has children `2i+1` and `2i+2`):
//!
//! ```text
//! ┌──────────┬───────────┬────────────────────────────────────────┐
//! │   Hash   │  Counter  │            Encrypted payload           │
//! │  (32B)   │ (8B, BE)  │      (raw block size - 40 bytes)       │
//! └──────────┴───────────┴────────────────────────────────────────┘
//! ```
//!
//! The head of the raw superblock stores the root secrets and the root hash:
//!
//! ```text
//! ┌───────────┬─────────────┬───────────┬───────────────┬───────────────┐
//! │ KeyOfKeys │ KeyOfNonces │ RootHash  │  TreeHashKey  │ User region   │
//! │   (32B)   │    (32B)    │   (32B)   │     (32B)     │               │
//! └───────────┴─────────────┴───────────┴───────────────┴───────────────┘
//! ```

mod auth_enc;
mod merkle;
mod super_block;

pub use self::auth_enc::AuthEncStore;
pub use self::merkle::BLOCK_OVERHEAD;
pub use self::super_block::SUPER_BLOCK_RESERVED;
