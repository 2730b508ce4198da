use serde::{Deserialize, Serialize};

use crate::storage::{Account, AccountId, Role};

/// Minimal identity projection attached to a resolved request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub account_id: AccountId,
    pub username: String,
    pub role: Role,
    pub balance: u64,
}

impl Principal {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

impl From<&Account> for Principal {
    fn from(a: &Account) -> Self {
        Self { account_id: a.id, username: a.username.clone(), role: a.role, balance: a.balance }
    }
}

/// Client-facing account projection returned by login, registration and `/me`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountView {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub balance: u64,
    pub role: Role,
}

impl From<&Account> for AccountView {
    fn from(a: &Account) -> Self {
        Self { id: a.id, username: a.username.clone(), email: a.email.clone(), balance: a.balance, role: a.role }
    }
}
