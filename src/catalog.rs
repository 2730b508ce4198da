//! Administrative writes: menu creation and the reward (credit) path.
//! Callers must have checked `Principal::is_admin` first.

use std::sync::Arc;

use tracing::info;

use crate::error::{AppError, AppResult};
use crate::storage::{AccountId, CatalogStore, NewResource, Resource};

pub struct Catalog {
    store: Arc<dyn CatalogStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self { Self { store } }

    pub fn create_menu(&self, mut new: NewResource) -> AppResult<Resource> {
        new.name = new.name.trim().to_string();
        if new.name.is_empty() {
            return Err(AppError::user("invalid_input", "menu name must not be empty"));
        }
        let menu = self.store.insert_resource(new)?;
        info!(resource = %menu.id, name = %menu.name, price = menu.unlock_price, public = menu.default_accessible, "menu created");
        Ok(menu)
    }

    pub fn credit(&self, account: AccountId, amount: u64) -> AppResult<u64> {
        if amount == 0 {
            return Err(AppError::user("invalid_input", "credit amount must be positive"));
        }
        let balance = self.store.credit(account, amount)?;
        info!(account = %account, amount, balance, "balance credited");
        Ok(balance)
    }
}
