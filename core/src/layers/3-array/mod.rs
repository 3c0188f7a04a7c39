//! The layer of byte arrays.
//!
//! An `ArrayStore` presents all the blocks of a `BlockStore` as one flat,
//! fixed-capacity byte array.

mod array_store;

pub use self::array_store::ArrayStore;
