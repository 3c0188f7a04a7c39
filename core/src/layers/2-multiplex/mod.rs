//! The layer of block store multiplexing.
//!
//! A `BlockStoreMultiplexor` carves one base `BlockStore` into a number of
//! independent `SubStore`s. Blocks are interleaved: block `i` of sub-store
//! `k` lives at base block `i * max_sub_stores + k`.
//!
//! The head of the base superblock records how many sub-stores exist; the
//! remainder is split evenly into one superblock slice per sub-store.
//!
//! ```text
//! ┌────────────┬──────────────┬──────────────┬─────┬──────────────────┐
//! │ Count (8B) │ SubStore 0   │ SubStore 1   │ ... │ SubStore max - 1 │
//! │    (BE)    │ super block  │ super block  │     │  super block     │
//! └────────────┴──────────────┴──────────────┴─────┴──────────────────┘
//! ```

mod multiplexor;

pub use self::multiplexor::{BlockStoreMultiplexor, SubStore};
