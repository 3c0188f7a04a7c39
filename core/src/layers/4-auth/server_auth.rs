use crate::layers::array::ArrayStore;
use crate::layers::multiplex::{BlockStoreMultiplexor, SubStore};
use crate::os::{pbkdf2_sha256, Hash, PrfKey};
use crate::prelude::*;

use core::mem::size_of;
use serde::{Deserialize, Serialize};

const PBKDF2_ITERATIONS: usize = 100_000;
const TABLE_LEN_SIZE: usize = size_of::<u64>();

/// One user account. Passwords are kept only as salted PBKDF2 hashes.
#[derive(Clone, Serialize, Deserialize)]
struct Account {
    username: String,
    salt: PrfKey,
    password_hash: Hash,
    sub_store: u64,
}

impl Account {
    fn matches(&self, password: &str) -> Result<bool> {
        let password_hash = pbkdf2_sha256(password.as_bytes(), &self.salt, PBKDF2_ITERATIONS)?;
        Ok(password_hash.ct_eq(&self.password_hash))
    }
}

/// Checks `password` against `account`. A missing account costs the same
/// PBKDF2 run as a present one and never matches.
fn verify_password(account: Option<&Account>, password: &str) -> Result<bool> {
    match account {
        Some(account) => account.matches(password),
        None => {
            pbkdf2_sha256(password.as_bytes(), &PrfKey::default(), PBKDF2_ITERATIONS)?;
            Ok(false)
        }
    }
}

/// Password-protected access to the sub-stores of a multiplexor.
///
/// The account table lives in `table_store`: an 8-byte big-endian length
/// followed by the `postcard` encoding of the accounts. Each account owns
/// exactly one sub-store of `multiplexor`.
pub struct ServerAuth<D> {
    table: ArrayStore<SubStore<D>>,
    multiplexor: Arc<BlockStoreMultiplexor<D>>,
    table_region: Mutex<()>,
}

impl<D: BlockStore> ServerAuth<D> {
    pub fn new(table_store: SubStore<D>, multiplexor: Arc<BlockStoreMultiplexor<D>>) -> Self {
        Self {
            table: ArrayStore::new(table_store),
            multiplexor,
            table_region: Mutex::new(()),
        }
    }

    /// Creates an account and returns the new user's sub-store, or `None` if
    /// `username` is taken.
    pub fn create_user(&self, username: &str, password: &str) -> Result<Option<SubStore<D>>> {
        if username.is_empty() {
            return_errno_with_msg!(InvalidArgs, "empty username");
        }

        let salt = PrfKey::random()?;
        let password_hash = pbkdf2_sha256(password.as_bytes(), &salt, PBKDF2_ITERATIONS)?;

        let _guard = self.table_region.lock();
        let mut accounts = self.load_accounts()?;
        if accounts.iter().any(|account| account.username == username) {
            debug!("[ServerAuth] User {} already exists", username);
            return Ok(None);
        }

        let sub_store = self.multiplexor.new_sub_store()?;
        accounts.push(Account {
            username: username.to_string(),
            salt,
            password_hash,
            sub_store: sub_store.index() as u64,
        });
        self.store_accounts(&accounts)?;

        debug!(
            "[ServerAuth] Created user {} with sub-store {}",
            username,
            sub_store.index()
        );
        Ok(Some(sub_store))
    }

    /// Returns the sub-store of `username` if `password` is right, or `None`
    /// if it is wrong or the user is unknown.
    pub fn auth(&self, username: &str, password: &str) -> Result<Option<SubStore<D>>> {
        let account = {
            let _guard = self.table_region.lock();
            self.load_accounts()?
                .into_iter()
                .find(|account| account.username == username)
        };
        if !verify_password(account.as_ref(), password)? {
            warn!("[ServerAuth] Failed login as {}", username);
            return Ok(None);
        }
        let Some(account) = account else {
            return Ok(None);
        };

        let index = usize::try_from(account.sub_store)
            .map_err(|_| Error::with_msg(InvalidArgs, "corrupted account table"))?;
        self.multiplexor.get_sub_store(index).map(Some)
    }

    /// Returns the number of accounts.
    pub fn num_users(&self) -> Result<usize> {
        let _guard = self.table_region.lock();
        Ok(self.load_accounts()?.len())
    }

    fn load_accounts(&self) -> Result<Vec<Account>> {
        let mut len_bytes = [0u8; TABLE_LEN_SIZE];
        self.table.read(&mut len_bytes, 0)?;
        let len = u64::from_be_bytes(len_bytes);
        if len == 0 {
            return Ok(Vec::new());
        }
        let Some(len) = usize::try_from(len)
            .ok()
            .filter(|len| *len <= self.table.capacity().saturating_sub(TABLE_LEN_SIZE))
        else {
            return_errno_with_msg!(InvalidArgs, "corrupted account table");
        };

        let mut table_bytes = vec![0u8; len];
        self.table.read(&mut table_bytes, TABLE_LEN_SIZE)?;
        let Ok(accounts) = postcard::from_bytes(&table_bytes) else {
            return_errno_with_msg!(InvalidArgs, "corrupted account table");
        };
        Ok(accounts)
    }

    fn store_accounts(&self, accounts: &[Account]) -> Result<()> {
        let Ok(table_bytes) = postcard::to_allocvec(accounts) else {
            return_errno_with_msg!(InvalidArgs, "failed to encode the account table");
        };
        if table_bytes.len() > self.table.capacity().saturating_sub(TABLE_LEN_SIZE) {
            return_errno_with_msg!(OutOfDisk, "account table is full");
        }

        self.table.write(&table_bytes, TABLE_LEN_SIZE)?;
        self.table
            .write(&(table_bytes.len() as u64).to_be_bytes(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::bio::MemDisk;
    use crate::layers::crypto::AuthEncStore;

    type Base = AuthEncStore<Arc<MemDisk>>;

    fn new_disk() -> Result<Arc<MemDisk>> {
        Ok(Arc::new(MemDisk::create(64, 104, 256)?))
    }

    fn new_auth(disk: Arc<MemDisk>) -> Result<ServerAuth<Base>> {
        let multiplexor = Arc::new(BlockStoreMultiplexor::create(
            AuthEncStore::create(disk)?,
            4,
        )?);
        let table_store = multiplexor.new_sub_store()?;
        Ok(ServerAuth::new(table_store, multiplexor))
    }

    fn reopen_auth(disk: Arc<MemDisk>) -> Result<ServerAuth<Base>> {
        let multiplexor = Arc::new(BlockStoreMultiplexor::open(AuthEncStore::open(disk)?, 4)?);
        let table_store = multiplexor.get_sub_store(0)?;
        Ok(ServerAuth::new(table_store, multiplexor))
    }

    #[test]
    fn create_and_auth() -> Result<()> {
        let auth = new_auth(new_disk()?)?;
        assert_eq!(auth.num_users()?, 0);

        let alice = auth.create_user("alice", "wonderland")?.unwrap();
        let bob = auth.create_user("bob", "builder")?.unwrap();
        assert_ne!(alice.index(), bob.index());
        assert!(auth.create_user("alice", "other")?.is_none());
        assert_eq!(auth.num_users()?, 2);

        alice.write_block(0, b"alice's data", 0)?;

        let store = auth.auth("alice", "wonderland")?.unwrap();
        assert_eq!(store.index(), alice.index());
        let mut buf = [0u8; 12];
        store.read_block(0, &mut buf, 0)?;
        assert_eq!(&buf, b"alice's data");

        assert!(auth.auth("alice", "builder")?.is_none());
        assert!(auth.auth("carol", "builder")?.is_none());
        assert_eq!(auth.auth("bob", "builder")?.unwrap().index(), bob.index());

        assert_eq!(
            auth.create_user("", "empty").unwrap_err().errno(),
            InvalidArgs
        );
        Ok(())
    }

    #[test]
    fn unknown_user_never_matches() -> Result<()> {
        let salt = PrfKey::random()?;
        let account = Account {
            username: "alice".to_string(),
            salt,
            password_hash: pbkdf2_sha256(b"wonderland", &salt, PBKDF2_ITERATIONS)?,
            sub_store: 1,
        };
        assert!(verify_password(Some(&account), "wonderland")?);
        assert!(!verify_password(Some(&account), "looking-glass")?);
        // Not even the password whose hash an all-zero salt would yield
        assert!(!verify_password(None, "")?);
        assert!(!verify_password(None, "wonderland")?);
        Ok(())
    }

    #[test]
    fn concurrent_users() -> Result<()> {
        let auth = Arc::new(new_auth(new_disk()?)?);
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let auth = auth.clone();
                std::thread::spawn(move || -> Result<usize> {
                    let store = auth.create_user(name, name)?.unwrap();
                    assert_eq!(auth.auth(name, name)?.unwrap().index(), store.index());
                    Ok(store.index())
                })
            })
            .collect();
        let mut indices: Vec<usize> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Result<_>>()?;
        indices.sort_unstable();
        assert_eq!(indices, [1, 2, 3]);
        assert_eq!(auth.num_users()?, 3);
        Ok(())
    }

    #[test]
    fn out_of_sub_stores() -> Result<()> {
        let auth = new_auth(new_disk()?)?;
        for name in ["a", "b", "c"] {
            assert!(auth.create_user(name, "pw")?.is_some());
        }
        assert_eq!(
            auth.create_user("d", "pw").unwrap_err().errno(),
            OutOfDisk
        );
        assert_eq!(auth.num_users()?, 3);
        Ok(())
    }

    #[test]
    fn accounts_survive_reopen() -> Result<()> {
        let disk = new_disk()?;
        let auth = new_auth(disk.clone())?;
        auth.create_user("alice", "wonderland")?
            .unwrap()
            .write_block(1, b"kept", 0)?;
        drop(auth);

        let auth = reopen_auth(disk)?;
        assert_eq!(auth.num_users()?, 1);
        assert!(auth.create_user("alice", "again")?.is_none());
        let store = auth.auth("alice", "wonderland")?.unwrap();
        let mut buf = [0u8; 4];
        store.read_block(1, &mut buf, 0)?;
        assert_eq!(&buf, b"kept");
        Ok(())
    }

    #[test]
    fn corrupted_table() -> Result<()> {
        let auth = new_auth(new_disk()?)?;
        auth.table.write(&u64::MAX.to_be_bytes(), 0)?;
        assert_eq!(auth.auth("alice", "pw").unwrap_err().errno(), InvalidArgs);
        auth.table.write(&4u64.to_be_bytes(), 0)?;
        auth.table.write(&[0xff; 4], TABLE_LEN_SIZE)?;
        assert_eq!(auth.num_users().unwrap_err().errno(), InvalidArgs);
        Ok(())
    }
}
