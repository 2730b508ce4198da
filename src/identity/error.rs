use thiserror::Error;

use crate::storage::StoreError;
use super::token::TokenError;

/// Authentication failures. Display strings are client-safe: they never carry
/// hashes, secrets or MAC bytes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid login or password")]
    InvalidCredentials,
    #[error("missing bearer token")]
    MissingToken,
    #[error("session expired, please log in again")]
    TokenExpired,
    #[error("invalid session token")]
    TokenInvalidSignature,
    #[error("malformed session token")]
    TokenMalformed,
    #[error("account no longer exists")]
    UnknownAccount,
    #[error("store unavailable, try again")]
    StoreUnavailable,
    #[error("{0}")]
    UserInput(String),
    #[error("username or email already registered")]
    LoginTaken,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::MissingToken => "missing_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalidSignature => "token_invalid_signature",
            AuthError::TokenMalformed => "token_malformed",
            AuthError::UnknownAccount => "unknown_account",
            AuthError::StoreUnavailable => "store_unavailable",
            AuthError::UserInput(_) => "invalid_input",
            AuthError::LoginTaken => "login_taken",
            AuthError::Internal(_) => "internal",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::InvalidSignature => AuthError::TokenInvalidSignature,
            TokenError::Malformed => AuthError::TokenMalformed,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => AuthError::StoreUnavailable,
            StoreError::LoginTaken => AuthError::LoginTaken,
            StoreError::MissingAccount => AuthError::UnknownAccount,
            other => AuthError::Internal(other.to_string()),
        }
    }
}
