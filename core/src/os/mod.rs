//! OS-specific or OS-dependent APIs.

mod std;
pub use self::std::{
    pbkdf2_sha256, Arc, Box, Hash, HashMap, Mutex, Prf, PrfKey, Rng, Skcipher,
    SkcipherIv, SkcipherKey, String, ToString, Vec,
};
