//!
//! recipevault storage module
//! --------------------------
//! Credential store, menu table and unlock ledger. All three live in one
//! in-memory `Tables` value guarded by a single mutex; when a data directory is
//! configured every write is mirrored to a bincode snapshot before it becomes
//! visible.
//!
//! Key responsibilities:
//! - Account lookup by id and by normalized username or email.
//! - The grant table keyed by (account, resource), which is the uniqueness
//!   backstop for purchases.
//! - `commit_purchase`, the only multi-record write: debit plus grant insert in
//!   one critical section.
//!
//! The core talks to storage through the `CatalogStore` trait so a different
//! backend (or a fault-injecting wrapper in tests) can be swapped in.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, warn};

pub mod records;
mod snapshot;

pub use records::{normalize_login, Account, AccountId, NewAccount, NewResource, Resource, ResourceId, Role, UnlockGrant};
use records::now_ms;
use snapshot::SnapshotFile;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("username or email already registered")]
    LoginTaken,
    #[error("account does not exist")]
    MissingAccount,
    #[error("resource does not exist")]
    MissingResource,
    #[error("grant already exists for this account and resource")]
    DuplicateGrant,
    #[error("balance {balance} is below price {price}")]
    InsufficientBalance { balance: u64, price: u64 },
    #[error("balance overflow")]
    Overflow,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam used by the authenticator, the request resolver and the
/// purchase transactor.
pub trait CatalogStore: Send + Sync {
    fn account(&self, id: AccountId) -> StoreResult<Option<Account>>;
    fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;
    fn account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;
    fn insert_account(&self, new: NewAccount) -> StoreResult<Account>;
    fn record_login(&self, id: AccountId, at_ms: i64) -> StoreResult<()>;

    fn resource(&self, id: ResourceId) -> StoreResult<Option<Resource>>;
    fn insert_resource(&self, new: NewResource) -> StoreResult<Resource>;

    fn grant(&self, account: AccountId, resource: ResourceId) -> StoreResult<Option<UnlockGrant>>;
    fn grants_for(&self, account: AccountId) -> StoreResult<Vec<UnlockGrant>>;

    /// Debit `price` and insert the (account, resource) grant as one unit.
    /// Returns the new balance. Fails `DuplicateGrant` if the pair is already
    /// granted and `InsufficientBalance` if the debit would go negative; in
    /// both cases nothing is written.
    fn commit_purchase(&self, account: AccountId, resource: ResourceId, price: u64) -> StoreResult<u64>;

    /// Add `amount` to the balance (reward path). Returns the new balance.
    fn credit(&self, account: AccountId, amount: u64) -> StoreResult<u64>;
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(crate) accounts: HashMap<AccountId, Account>,
    by_username: HashMap<String, AccountId>,
    by_email: HashMap<String, AccountId>,
    pub(crate) resources: HashMap<ResourceId, Resource>,
    pub(crate) grants: HashMap<(AccountId, ResourceId), UnlockGrant>,
}

impl Tables {
    pub(crate) fn insert_account_row(&mut self, account: Account) {
        self.by_username.insert(account.username.clone(), account.id);
        self.by_email.insert(account.email.clone(), account.id);
        self.accounts.insert(account.id, account);
    }
}

/// Thread-safe handle over the table set. Cloning shares the same tables.
#[derive(Clone)]
pub struct SharedStore {
    tables: Arc<Mutex<Tables>>,
    snapshot: Option<SnapshotFile>,
}

impl SharedStore {
    /// Memory-only store; contents are lost on drop.
    pub fn in_memory() -> Self {
        Self { tables: Arc::new(Mutex::new(Tables::default())), snapshot: None }
    }

    /// Open (or create) a snapshot-backed store under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = SnapshotFile::new(dir)?;
        let tables = file.load()?;
        Ok(Self { tables: Arc::new(Mutex::new(tables)), snapshot: Some(file) })
    }

    pub fn is_persistent(&self) -> bool { self.snapshot.is_some() }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let guard = self.tables.lock();
        f(&guard)
    }

    /// Apply `f` under the lock. With a snapshot configured, `f` runs against a
    /// copy that replaces the live tables only after the snapshot is on disk.
    /// `f` must validate before mutating so an `Err` leaves no partial state.
    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.tables.lock();
        match &self.snapshot {
            None => f(&mut guard),
            Some(file) => {
                let mut next = (*guard).clone();
                let out = f(&mut next)?;
                if let Err(e) = file.save(&next) {
                    error!(error = %e, "snapshot write failed; change discarded");
                    return Err(StoreError::Unavailable(e.to_string()));
                }
                *guard = next;
                Ok(out)
            }
        }
    }
}

impl CatalogStore for SharedStore {
    fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.read(|t| t.accounts.get(&id).cloned()))
    }

    fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let key = normalize_login(username);
        Ok(self.read(|t| t.by_username.get(&key).and_then(|id| t.accounts.get(id)).cloned()))
    }

    fn account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let key = normalize_login(email);
        Ok(self.read(|t| t.by_email.get(&key).and_then(|id| t.accounts.get(id)).cloned()))
    }

    fn insert_account(&self, new: NewAccount) -> StoreResult<Account> {
        let username = normalize_login(&new.username);
        let email = normalize_login(&new.email);
        self.write(|t| {
            if t.by_username.contains_key(&username) || t.by_email.contains_key(&email) {
                return Err(StoreError::LoginTaken);
            }
            let account = Account {
                id: uuid::Uuid::new_v4(),
                username,
                email,
                password_hash: new.password_hash,
                balance: new.balance,
                role: new.role,
                created_at: now_ms(),
                last_login_at: None,
            };
            t.insert_account_row(account.clone());
            Ok(account)
        })
    }

    fn record_login(&self, id: AccountId, at_ms: i64) -> StoreResult<()> {
        self.write(|t| {
            let account = t.accounts.get_mut(&id).ok_or(StoreError::MissingAccount)?;
            account.last_login_at = Some(at_ms);
            Ok(())
        })
    }

    fn resource(&self, id: ResourceId) -> StoreResult<Option<Resource>> {
        Ok(self.read(|t| t.resources.get(&id).cloned()))
    }

    fn insert_resource(&self, new: NewResource) -> StoreResult<Resource> {
        self.write(|t| {
            let resource = Resource {
                id: uuid::Uuid::new_v4(),
                name: new.name,
                summary: new.summary,
                body: new.body,
                unlock_price: new.unlock_price,
                default_accessible: new.default_accessible,
            };
            t.resources.insert(resource.id, resource.clone());
            Ok(resource)
        })
    }

    fn grant(&self, account: AccountId, resource: ResourceId) -> StoreResult<Option<UnlockGrant>> {
        Ok(self.read(|t| t.grants.get(&(account, resource)).cloned()))
    }

    fn grants_for(&self, account: AccountId) -> StoreResult<Vec<UnlockGrant>> {
        let mut out: Vec<UnlockGrant> = self.read(|t| {
            t.grants.values().filter(|g| g.account_id == account).cloned().collect()
        });
        out.sort_by_key(|g| g.granted_at);
        Ok(out)
    }

    fn commit_purchase(&self, account: AccountId, resource: ResourceId, price: u64) -> StoreResult<u64> {
        self.write(|t| {
            if t.grants.contains_key(&(account, resource)) {
                return Err(StoreError::DuplicateGrant);
            }
            if !t.resources.contains_key(&resource) {
                return Err(StoreError::MissingResource);
            }
            let acct = t.accounts.get_mut(&account).ok_or(StoreError::MissingAccount)?;
            let new_balance = acct
                .balance
                .checked_sub(price)
                .ok_or(StoreError::InsufficientBalance { balance: acct.balance, price })?;
            acct.balance = new_balance;
            t.grants.insert(
                (account, resource),
                UnlockGrant { account_id: account, resource_id: resource, price_paid: price, granted_at: now_ms() },
            );
            Ok(new_balance)
        })
    }

    fn credit(&self, account: AccountId, amount: u64) -> StoreResult<u64> {
        self.write(|t| {
            let acct = t.accounts.get_mut(&account).ok_or(StoreError::MissingAccount)?;
            acct.balance = acct.balance.checked_add(amount).ok_or(StoreError::Overflow)?;
            Ok(acct.balance)
        })
    }
}

/// Run an idempotent read, retrying `StoreError::Unavailable` up to `retries`
/// extra times with a linear backoff. Other errors return immediately.
/// Never use this for writes.
pub async fn read_with_retry<T>(retries: u32, what: &'static str, f: impl Fn() -> StoreResult<T>) -> StoreResult<T> {
    let mut attempt: u32 = 0;
    loop {
        match f() {
            Err(StoreError::Unavailable(reason)) if attempt < retries => {
                attempt += 1;
                warn!(op = what, attempt, %reason, "store read failed; retrying");
                tokio::time::sleep(Duration::from_millis(25 * attempt as u64)).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod storage_tests;
