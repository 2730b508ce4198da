use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::principal::Principal;
use super::token::{Claims, TokenCodec, TokenError};

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub principal: Principal,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates signed session tokens. Holds no per-session state:
/// a token stays valid until its embedded expiry.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    codec: TokenCodec,
}

impl SessionManager {
    pub fn new(codec: TokenCodec, ttl: Duration) -> Self { Self { ttl, codec } }

    pub fn issue(&self, principal: Principal) -> Session {
        self.issue_at(principal, Utc::now())
    }

    pub fn issue_at(&self, principal: Principal, now: DateTime<Utc>) -> Session {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let expires_at = now + ttl;
        let claims = Claims {
            sub: principal.account_id,
            role: principal.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = self.codec.sign(&claims);
        debug!(user = %principal.username, ttl_secs = self.ttl.as_secs(), "session.issue");
        Session { token, principal, issued_at: now, expires_at }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.verify(token)
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        self.codec.verify_at(token, now)
    }
}
