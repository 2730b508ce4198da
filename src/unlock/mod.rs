//!
//! Purchase transactor and unlock status queries.
//! --------------------------------------------
//! A purchase permanently grants an account access to a priced menu in
//! exchange for xu. The pre-checks here produce precise errors; the store's
//! `commit_purchase` repeats the grant and balance checks inside its critical
//! section, so a concurrent duplicate loses with `AlreadyPurchased` and never
//! double-debits.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::{self, AccountId, CatalogStore, Resource, ResourceId, StoreError, UnlockGrant};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PurchaseError {
    #[error("account not found")]
    AccountNotFound,
    #[error("menu not found")]
    ResourceNotFound,
    #[error("menu already unlocked by this account")]
    AlreadyPurchased,
    #[error("menu is free to view; nothing to unlock")]
    AlreadyUnlocked,
    #[error("balance {balance} xu is below the unlock price of {price} xu")]
    InsufficientBalance { balance: u64, price: u64 },
    #[error("store unavailable, try again")]
    StoreUnavailable,
}

impl PurchaseError {
    pub fn code(&self) -> &'static str {
        match self {
            PurchaseError::AccountNotFound => "account_not_found",
            PurchaseError::ResourceNotFound => "resource_not_found",
            PurchaseError::AlreadyPurchased => "already_purchased",
            PurchaseError::AlreadyUnlocked => "already_unlocked",
            PurchaseError::InsufficientBalance { .. } => "insufficient_balance",
            PurchaseError::StoreUnavailable => "store_unavailable",
        }
    }
}

impl From<StoreError> for PurchaseError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingAccount => PurchaseError::AccountNotFound,
            StoreError::MissingResource => PurchaseError::ResourceNotFound,
            StoreError::DuplicateGrant => PurchaseError::AlreadyPurchased,
            StoreError::InsufficientBalance { balance, price } => PurchaseError::InsufficientBalance { balance, price },
            // LoginTaken and Overflow are not produced on purchase paths.
            StoreError::Unavailable(_) | StoreError::LoginTaken | StoreError::Overflow => PurchaseError::StoreUnavailable,
        }
    }
}

/// What a purchase of a default-accessible menu does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublicResourcePolicy {
    /// Succeed with zero cost and no grant row.
    #[default]
    Free,
    /// Fail with `AlreadyUnlocked`.
    Reject,
}

impl FromStr for PublicResourcePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PublicResourcePolicy::Free),
            "reject" => Ok(PublicResourcePolicy::Reject),
            other => Err(anyhow::anyhow!("unknown public resource policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PurchaseReceipt {
    #[serde(rename = "balance")]
    pub new_balance: u64,
    pub charged: u64,
}

/// Menu as seen by one account: `body` is present only when unlocked.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MenuView {
    pub id: ResourceId,
    pub name: String,
    pub summary: String,
    pub unlock_price: u64,
    pub default_accessible: bool,
    pub locked: bool,
    pub body: Option<String>,
}

pub struct Purchaser {
    store: Arc<dyn CatalogStore>,
    policy: PublicResourcePolicy,
    read_retries: u32,
}

impl Purchaser {
    pub fn new(store: Arc<dyn CatalogStore>, policy: PublicResourcePolicy) -> Self {
        Self { store, policy, read_retries: 2 }
    }

    pub fn with_read_retries(mut self, retries: u32) -> Self { self.read_retries = retries; self }

    async fn load_resource(&self, id: ResourceId) -> Result<Resource, PurchaseError> {
        storage::read_with_retry(self.read_retries, "resource", || self.store.resource(id))
            .await?
            .ok_or(PurchaseError::ResourceNotFound)
    }

    async fn load_grant(&self, account: AccountId, resource: ResourceId) -> Result<Option<UnlockGrant>, PurchaseError> {
        Ok(storage::read_with_retry(self.read_retries, "grant", || self.store.grant(account, resource)).await?)
    }

    /// Spend xu to unlock `resource_id` for `account_id`. The account id must
    /// come from the resolved request identity.
    pub async fn purchase(&self, account_id: AccountId, resource_id: ResourceId) -> Result<PurchaseReceipt, PurchaseError> {
        let account = storage::read_with_retry(self.read_retries, "account", || self.store.account(account_id))
            .await?
            .ok_or(PurchaseError::AccountNotFound)?;
        let resource = self.load_resource(resource_id).await?;

        if resource.default_accessible {
            return match self.policy {
                PublicResourcePolicy::Free => Ok(PurchaseReceipt { new_balance: account.balance, charged: 0 }),
                PublicResourcePolicy::Reject => Err(PurchaseError::AlreadyUnlocked),
            };
        }
        if self.load_grant(account_id, resource_id).await?.is_some() {
            return Err(PurchaseError::AlreadyPurchased);
        }
        let price = resource.unlock_price;
        if account.balance < price {
            warn!(account = %account_id, resource = %resource_id, balance = account.balance, price, "purchase rejected: insufficient balance");
            return Err(PurchaseError::InsufficientBalance { balance: account.balance, price });
        }

        // Writes are never retried.
        let new_balance = self.store.commit_purchase(account_id, resource_id, price).map_err(|e| {
            warn!(account = %account_id, resource = %resource_id, error = %e, "purchase commit rejected");
            PurchaseError::from(e)
        })?;
        info!(account = %account_id, resource = %resource_id, price, new_balance, "purchase committed");
        Ok(PurchaseReceipt { new_balance, charged: price })
    }

    pub async fn is_unlocked(&self, account_id: AccountId, resource_id: ResourceId) -> Result<bool, PurchaseError> {
        let resource = self.load_resource(resource_id).await?;
        if resource.default_accessible {
            return Ok(true);
        }
        Ok(self.load_grant(account_id, resource_id).await?.is_some())
    }

    /// Grants held by the account, oldest first.
    pub async fn unlocked_resources(&self, account_id: AccountId) -> Result<Vec<UnlockGrant>, PurchaseError> {
        Ok(storage::read_with_retry(self.read_retries, "grants_for", || self.store.grants_for(account_id)).await?)
    }

    pub async fn menu_view(&self, account_id: AccountId, resource_id: ResourceId) -> Result<MenuView, PurchaseError> {
        let resource = self.load_resource(resource_id).await?;
        let unlocked = resource.default_accessible || self.load_grant(account_id, resource_id).await?.is_some();
        Ok(MenuView {
            id: resource.id,
            name: resource.name,
            summary: resource.summary,
            unlock_price: resource.unlock_price,
            default_accessible: resource.default_accessible,
            locked: !unlocked,
            body: unlocked.then_some(resource.body),
        })
    }
}
