mod crypto;

pub use self::crypto::{Prf, RandomInit, Rng, Skcipher};
