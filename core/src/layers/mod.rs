#[path = "0-bio/mod.rs"]
pub mod bio;
#[path = "1-crypto/mod.rs"]
pub mod crypto;
#[path = "2-multiplex/mod.rs"]
pub mod multiplex;
#[path = "3-array/mod.rs"]
pub mod array;
#[path = "4-auth/mod.rs"]
pub mod auth;
