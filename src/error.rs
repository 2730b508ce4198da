//! Unified application error model and mapping helpers.
//! Domain modules raise their own typed errors (`AuthError`, `PurchaseError`, `StoreError`);
//! this module folds them into one client-visible shape with a stable `code` and an HTTP status.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::AuthError;
use crate::storage::StoreError;
use crate::unlock::PurchaseError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Auth { code: String, message: String },
    PaymentRequired { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Auth { code, .. }
            | AppError::PaymentRequired { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Auth { message, .. }
            | AppError::PaymentRequired { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn payment<S: Into<String>>(code: S, msg: S) -> Self { AppError::PaymentRequired { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::PaymentRequired { .. } => 402,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let code = err.code();
        let msg = err.to_string();
        match err {
            AuthError::UserInput(_) => AppError::user(code.to_string(), msg),
            AuthError::LoginTaken => AppError::conflict(code.to_string(), msg),
            AuthError::StoreUnavailable => AppError::io(code.to_string(), msg),
            AuthError::Internal(_) => AppError::internal(code.to_string(), "internal error".to_string()),
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::TokenExpired
            | AuthError::TokenInvalidSignature
            | AuthError::TokenMalformed
            | AuthError::UnknownAccount => AppError::auth(code.to_string(), msg),
        }
    }
}

impl From<PurchaseError> for AppError {
    fn from(err: PurchaseError) -> Self {
        let code = err.code().to_string();
        let msg = err.to_string();
        match err {
            PurchaseError::AccountNotFound | PurchaseError::ResourceNotFound => AppError::not_found(code, msg),
            PurchaseError::AlreadyPurchased | PurchaseError::AlreadyUnlocked => AppError::conflict(code, msg),
            PurchaseError::InsufficientBalance { .. } => AppError::payment(code, msg),
            PurchaseError::StoreUnavailable => AppError::io(code, msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => AppError::io("store_unavailable", "store unavailable, try again"),
            StoreError::LoginTaken => AppError::conflict("login_taken", "username or email already registered"),
            StoreError::MissingAccount => AppError::not_found("account_not_found", "account not found"),
            StoreError::MissingResource => AppError::not_found("resource_not_found", "menu not found"),
            StoreError::DuplicateGrant => AppError::conflict("already_purchased", "menu already unlocked by this account"),
            StoreError::InsufficientBalance { .. } => AppError::payment("insufficient_balance", "balance too low to unlock this menu"),
            StoreError::Overflow => AppError::user("balance_overflow", "balance would overflow"),
        }
    }
}

/// Bodies that fail to extract (bad JSON, wrong content type, missing
/// fields) answer with the same JSON error shape as every other failure.
impl From<JsonRejection> for AppError {
    fn from(rej: JsonRejection) -> Self {
        let code = match &rej {
            JsonRejection::MissingJsonContentType(_) => "unsupported_content_type",
            _ => "invalid_body",
        };
        AppError::user(code.to_string(), rej.body_text())
    }
}
