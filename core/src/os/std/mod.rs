//! Std user space implementations.

use crate::error::Errno;
use crate::prelude::{Error, Result};
use openssl::error::ErrorStack;
use openssl::hash::{Hasher, MessageDigest};
use openssl::memcmp;
use openssl::pkcs5::pbkdf2_hmac;
use openssl::rand::rand_bytes;
use openssl::symm::{decrypt, encrypt, Cipher};
use pod::Pod;
use serde::{Deserialize, Serialize};

/// Reuse the `Mutex` implementation.
pub use spin::Mutex;

pub use std::boxed::Box;
pub use std::collections::HashMap;
pub use std::string::{String, ToString};
pub use std::sync::Arc;
pub use std::vec::Vec;

/// A random number generator.
pub struct Rng;

impl crate::util::Rng for Rng {
    fn new(_seed: &[u8]) -> Self {
        Self
    }

    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        rand_bytes(dest).map_err(|_| Error::with_msg(Errno::OsSpecUnknown, "rand_bytes failed"))
    }
}

/// A macro to define byte_array_types used by `Prf` or `Skcipher`.
///
/// Types marked `secret` never print their content.
macro_rules! new_byte_array_type {
    ($name:ident, $n:expr) => {
        new_byte_array_type!(@define $name, $n);

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for byte in self.0.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, ")")
            }
        }
    };
    ($name:ident, $n:expr, secret) => {
        new_byte_array_type!(@define $name, $n);

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}([REDACTED])", stringify!($name))
            }
        }
    };
    (@define $name:ident, $n:expr) => {
        #[repr(C)]
        #[derive(Copy, Clone, Pod, Default, PartialEq, Eq, Deserialize, Serialize)]
        pub struct $name([u8; $n]);

        impl $name {
            /// The size in bytes.
            pub const SIZE: usize = $n;

            /// Build a value from the first `SIZE` bytes of `bytes`.
            pub fn from_prefix(bytes: &[u8]) -> Self {
                debug_assert!(bytes.len() >= $n);
                let mut result = Self::default();
                result.0.copy_from_slice(&bytes[..$n]);
                result
            }

            /// Whether every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|byte| *byte == 0)
            }

            /// Compare in constant time.
            pub fn ct_eq(&self, other: &Self) -> bool {
                memcmp::eq(&self.0, &other.0)
            }
        }

        impl core::ops::Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &Self::Target {
                self.0.as_slice()
            }
        }

        impl core::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                self.0.as_mut_slice()
            }
        }

        impl crate::util::RandomInit for $name {
            fn random() -> Result<Self> {
                use crate::util::Rng;

                let mut result = Self::default();
                let rng = self::Rng::new(&[]);
                rng.fill_bytes(&mut result)?;
                Ok(result)
            }
        }
    };
}

const HMAC_SHA256_KEY_SIZE: usize = 32;
const HMAC_SHA256_OUTPUT_SIZE: usize = 32;

new_byte_array_type!(PrfKey, HMAC_SHA256_KEY_SIZE, secret);
new_byte_array_type!(Hash, HMAC_SHA256_OUTPUT_SIZE);

/// A pseudo-random function, HMAC-SHA256 (RFC 2104).
///
/// The inner digest is streamed through an openssl `Hasher`, so `update`
/// never buffers its input.
pub struct Prf {
    inner: Hasher,
    outer_pad: [u8; HMAC_SHA256_BLOCK_SIZE],
}

const HMAC_SHA256_BLOCK_SIZE: usize = 64;
const HMAC_IPAD: u8 = 0x36;
const HMAC_OPAD: u8 = 0x5c;

fn prf_fault(_: ErrorStack) -> Error {
    Error::with_msg(Errno::OsSpecUnknown, "hmac-sha256 failed")
}

impl crate::util::Prf for Prf {
    type Key = PrfKey;
    type Output = Hash;

    fn new(key: &Self::Key) -> Result<Self> {
        let mut inner_pad = [HMAC_IPAD; HMAC_SHA256_BLOCK_SIZE];
        let mut outer_pad = [HMAC_OPAD; HMAC_SHA256_BLOCK_SIZE];
        for (i, byte) in key.iter().enumerate() {
            inner_pad[i] ^= byte;
            outer_pad[i] ^= byte;
        }

        let mut inner = Hasher::new(MessageDigest::sha256()).map_err(prf_fault)?;
        inner.update(&inner_pad).map_err(prf_fault)?;
        Ok(Self { inner, outer_pad })
    }

    fn update(&mut self, data: &[u8]) -> Result<()> {
        self.inner.update(data).map_err(prf_fault)
    }

    fn finalize(mut self) -> Result<Self::Output> {
        let inner_digest = self.inner.finish().map_err(prf_fault)?;

        let mut outer = Hasher::new(MessageDigest::sha256()).map_err(prf_fault)?;
        outer.update(&self.outer_pad).map_err(prf_fault)?;
        outer.update(&inner_digest).map_err(prf_fault)?;
        let digest = outer.finish().map_err(prf_fault)?;
        Ok(Hash::from_prefix(&digest))
    }
}

/// Derive a password hash with PBKDF2-HMAC-SHA256.
pub fn pbkdf2_sha256(password: &[u8], salt: &PrfKey, iterations: usize) -> Result<Hash> {
    let mut output = Hash::default();
    pbkdf2_hmac(
        password,
        salt,
        iterations,
        MessageDigest::sha256(),
        &mut output,
    )
    .map_err(|_| Error::with_msg(Errno::OsSpecUnknown, "pbkdf2 failed"))?;
    Ok(output)
}

const AES_CTR_KEY_SIZE: usize = 32;
const AES_CTR_IV_SIZE: usize = 16;

new_byte_array_type!(SkcipherKey, AES_CTR_KEY_SIZE, secret);
new_byte_array_type!(SkcipherIv, AES_CTR_IV_SIZE);

/// A symmetric key cipher, AES-256-CTR.
pub struct Skcipher;

impl Skcipher {
    /// Construct a `Skcipher` instance.
    pub fn new() -> Self {
        Self
    }
}

impl crate::util::Skcipher for Skcipher {
    type Key = SkcipherKey;
    type Iv = SkcipherIv;

    fn encrypt(
        &self,
        input: &[u8],
        key: &Self::Key,
        iv: &Self::Iv,
        output: &mut [u8],
    ) -> Result<()> {
        if input.len() != output.len() {
            return Err(Error::with_msg(Errno::InvalidArgs, "cipher buffers differ in length"));
        }
        let result = encrypt(Cipher::aes_256_ctr(), &key[..], Some(&iv[..]), input)
            .map_err(|_| Error::new(Errno::EncryptFailed))?;
        output.copy_from_slice(result.as_slice());
        Ok(())
    }

    fn decrypt(
        &self,
        input: &[u8],
        key: &Self::Key,
        iv: &Self::Iv,
        output: &mut [u8],
    ) -> Result<()> {
        if input.len() != output.len() {
            return Err(Error::with_msg(Errno::InvalidArgs, "cipher buffers differ in length"));
        }
        let result = decrypt(Cipher::aes_256_ctr(), &key[..], Some(&iv[..]), input)
            .map_err(|_| Error::new(Errno::DecryptFailed))?;
        output.copy_from_slice(result.as_slice());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn rng() {
        use super::Rng as OsRng;
        use crate::util::Rng;

        let rng = OsRng::new(&[]);
        let mut buf = [0u8; 16];
        rng.fill_bytes(&mut buf).unwrap();
        println!("random bytes: {:?}", buf);
    }

    #[test]
    fn prf() {
        use super::{Prf as OsPrf, PrfKey};
        use crate::util::{Prf, RandomInit};

        let key = PrfKey::random().unwrap();
        let one_shot = OsPrf::eval(&key, b"counter||payload").unwrap();

        let mut prf = OsPrf::new(&key).unwrap();
        prf.update(b"counter").unwrap();
        prf.update(b"||").unwrap();
        prf.update(b"payload").unwrap();
        let accumulated = prf.finalize().unwrap();
        assert_eq!(one_shot, accumulated);

        let other_key = PrfKey::random().unwrap();
        let other = OsPrf::eval(&other_key, b"counter||payload").unwrap();
        assert_ne!(one_shot, other);
        assert!(!one_shot.is_zero());
    }

    #[test]
    fn prf_rfc4231_vectors() {
        use super::{Hash, Prf as OsPrf, PrfKey};
        use crate::util::Prf;

        // RFC 4231, test cases 1 and 2. Keys shorter than 32 bytes are
        // zero-padded, which HMAC treats identically.
        let cases: [(&[u8], &[u8], [u8; 32]); 2] = [
            (
                &[0x0b; 20],
                b"Hi There",
                [
                    0xb0, 0x34, 0x4c, 0x61, 0xd8, 0xdb, 0x38, 0x53, 0x5c, 0xa8, 0xaf, 0xce, 0xaf,
                    0x0b, 0xf1, 0x2b, 0x88, 0x1d, 0xc2, 0x00, 0xc9, 0x83, 0x3d, 0xa7, 0x26, 0xe9,
                    0x37, 0x6c, 0x2e, 0x32, 0xcf, 0xf7,
                ],
            ),
            (
                b"Jefe",
                b"what do ya want for nothing?",
                [
                    0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08,
                    0x95, 0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec,
                    0x58, 0xb9, 0x64, 0xec, 0x38, 0x43,
                ],
            ),
        ];
        for (key_prefix, data, expected) in cases {
            let mut key_bytes = [0u8; 32];
            key_bytes[..key_prefix.len()].copy_from_slice(key_prefix);
            let key = PrfKey::from_prefix(&key_bytes);
            let mac = OsPrf::eval(&key, data).unwrap();
            assert_eq!(mac, Hash::from_prefix(&expected));
        }
    }

    #[test]
    fn prf_streams_large_input() {
        use super::{Prf as OsPrf, PrfKey};
        use crate::util::{Prf, RandomInit};

        let key = PrfKey::random().unwrap();
        let data = vec![0xa5u8; 1 << 20];
        let one_shot = OsPrf::eval(&key, &data).unwrap();

        let mut prf = OsPrf::new(&key).unwrap();
        for chunk in data.chunks(4096) {
            prf.update(chunk).unwrap();
        }
        assert_eq!(prf.finalize().unwrap(), one_shot);
    }

    #[test]
    fn skcipher() {
        use super::{Skcipher as OsSkcipher, SkcipherIv, SkcipherKey};
        use crate::util::{RandomInit, Skcipher};

        let data = b"Some Crypto Text";
        let key = SkcipherKey::random().unwrap();
        let iv = SkcipherIv::random().unwrap();

        let skcipher = OsSkcipher::new();
        let mut ciphertext = [0u8; 16];
        skcipher.encrypt(data, &key, &iv, &mut ciphertext).unwrap();
        assert_ne!(data, &ciphertext);

        let mut plaintext = [0u8; 16];
        skcipher
            .decrypt(&ciphertext, &key, &iv, &mut plaintext)
            .unwrap();
        assert_eq!(data, &plaintext);

        let mut short = [0u8; 8];
        assert!(skcipher.encrypt(data, &key, &iv, &mut short).is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        use super::{Hash, PrfKey};

        let key = PrfKey::from_prefix(&[0xab; 32]);
        assert_eq!(format!("{:?}", key), "PrfKey([REDACTED])");
        let hash = Hash::from_prefix(&[0xab; 32]);
        assert!(format!("{:?}", hash).starts_with("Hash(abab"));
    }
}
