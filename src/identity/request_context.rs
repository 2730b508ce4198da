use std::sync::Arc;

use tracing::debug;

use crate::storage::{self, CatalogStore};

use super::principal::Principal;
use super::session::SessionManager;
use super::AuthError;

/// Identity resolved for one in-flight request. Handlers receive it by value
/// and it is dropped with the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub request_id: String,
}

/// Extract the token from an `Authorization` value. Accepts `Bearer <token>`
/// (scheme case-insensitive) and a bare `<token>`.
pub fn bearer_token(raw: Option<&str>) -> Result<&str, AuthError> {
    let raw = raw.map(str::trim).unwrap_or("");
    let token = match raw.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if raw.eq_ignore_ascii_case("bearer") => "",
        _ => raw,
    };
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Authorization step invoked by the routing layer before every protected handler.
pub struct IdentityResolver {
    store: Arc<dyn CatalogStore>,
    sessions: Arc<SessionManager>,
    read_retries: u32,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn CatalogStore>, sessions: Arc<SessionManager>) -> Self {
        Self { store, sessions, read_retries: 2 }
    }

    pub fn with_read_retries(mut self, retries: u32) -> Self { self.read_retries = retries; self }

    /// Resolve an `Authorization` header value to a fresh account projection.
    pub async fn resolve(&self, raw_authorization: Option<&str>) -> Result<RequestContext, AuthError> {
        let token = bearer_token(raw_authorization)?;
        let claims = self.sessions.validate(token).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::from(e)
        })?;
        let account = storage::read_with_retry(self.read_retries, "account", || self.store.account(claims.sub))
            .await?
            .ok_or(AuthError::UnknownAccount)?;
        Ok(RequestContext {
            principal: Principal::from(&account),
            request_id: uuid::Uuid::new_v4().to_string(),
        })
    }
}
