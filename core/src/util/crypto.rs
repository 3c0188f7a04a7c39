use crate::prelude::Result;

use core::ops::{Deref, DerefMut};

/// Random initialization for Key, Iv and Mac.
pub trait RandomInit: Default {
    fn random() -> Result<Self>;
}

/// Random number generator.
pub trait Rng {
    /// Create an instance, with `seed` to provide secure entropy.
    fn new(seed: &[u8]) -> Self;

    /// Fill `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;
}

/// Symmetric key cipher without integrity protection (e.g., a stream cipher).
///
/// The cipher is length-preserving: `output` must be as long as `input`.
pub trait Skcipher {
    type Key: Deref<Target = [u8]> + DerefMut<Target = [u8]> + Default + RandomInit;
    type Iv: Deref<Target = [u8]> + DerefMut<Target = [u8]> + Default + RandomInit;

    /// Encrypt the `input` into `output` with `key` and `iv`.
    fn encrypt(&self, input: &[u8], key: &Self::Key, iv: &Self::Iv, output: &mut [u8])
        -> Result<()>;

    /// Decrypt the `input` into `output` with `key` and `iv`.
    fn decrypt(&self, input: &[u8], key: &Self::Key, iv: &Self::Iv, output: &mut [u8])
        -> Result<()>;
}

/// Pseudo-random function (a keyed hash).
///
/// The input is streamed in with `update` and the fixed-size digest is
/// produced by `finalize`, so a digest over several fields can be built
/// without concatenating them first.
pub trait Prf: Sized {
    type Key: Deref<Target = [u8]> + Default + RandomInit;
    type Output: Deref<Target = [u8]> + Default;

    /// Start a new evaluation under `key`.
    fn new(key: &Self::Key) -> Result<Self>;

    /// Append `data` to the input.
    fn update(&mut self, data: &[u8]) -> Result<()>;

    /// Produce the digest of everything appended so far.
    fn finalize(self) -> Result<Self::Output>;

    /// One-shot evaluation over `data`.
    fn eval(key: &Self::Key, data: &[u8]) -> Result<Self::Output> {
        let mut prf = Self::new(key)?;
        prf.update(data)?;
        prf.finalize()
    }
}
