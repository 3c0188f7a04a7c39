//! The layer of user accounts.
//!
//! `ServerAuth` keeps a table of accounts in one sub-store of a
//! `BlockStoreMultiplexor` and hands every user a sub-store of their own.

mod server_auth;

pub use self::server_auth::ServerAuth;
