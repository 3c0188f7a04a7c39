//! An authenticated, encrypted block store.
//!
//! `AuthEncStore` wraps an untrusted block device (anything implementing
//! `BlockStore`) and guarantees the confidentiality and integrity of every
//! block it holds, including freshness: replaying an old, validly-encrypted
//! version of a block is detected before any data is returned.
//!
//! The layers above it (`BlockStoreMultiplexor`, `ArrayStore`, `ServerAuth`)
//! are thin consumers that only speak the `BlockStore` contract.

mod error;
mod layers;
mod os;
mod prelude;
mod util;

pub use self::error::{Errno, Error};
pub use self::layers::array::ArrayStore;
pub use self::layers::auth::ServerAuth;
pub use self::layers::bio::{BlockId, BlockStore, FileDisk, MemDisk};
pub use self::layers::crypto::{AuthEncStore, BLOCK_OVERHEAD, SUPER_BLOCK_RESERVED};
pub use self::layers::multiplex::{BlockStoreMultiplexor, SubStore};
pub use self::os::{Hash, PrfKey, Rng};
pub use self::util::{RandomInit, Rng as _};

/// The result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
