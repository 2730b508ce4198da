//! Persisted record types: accounts, priced menus, and unlock grants.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

pub type AccountId = Uuid;
pub type ResourceId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    /// Normalized login name.
    pub username: String,
    /// Normalized email.
    pub email: String,
    /// Argon2 PHC string; salt is embedded.
    pub password_hash: String,
    pub balance: u64,
    pub role: Role,
    pub created_at: i64,
    #[serde(default)]
    pub last_login_at: Option<i64>,
}

/// Registration input. `password_hash` must already be a PHC string.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub balance: u64,
    pub role: Role,
}

/// A priced menu. `body` is the premium content gated by unlock status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub summary: String,
    pub body: String,
    pub unlock_price: u64,
    pub default_accessible: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewResource {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub body: String,
    pub unlock_price: u64,
    #[serde(default)]
    pub default_accessible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockGrant {
    pub account_id: AccountId,
    pub resource_id: ResourceId,
    pub price_paid: u64,
    pub granted_at: i64,
}

/// Case-normalize a login name or email: NFKC, trimmed, lowercased.
pub fn normalize_login(raw: &str) -> String {
    raw.trim().nfkc().collect::<String>().to_lowercase()
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_width() {
        assert_eq!(normalize_login("  Alice@Example.COM "), "alice@example.com");
        // fullwidth latin letters fold under NFKC
        assert_eq!(normalize_login("\u{FF21}\u{FF4C}\u{FF49}"), "ali");
    }
}
