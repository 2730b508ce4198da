use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::storage::{self, normalize_login, Account, AccountId, CatalogStore, NewAccount, Role};

use super::password::{hash_password_blocking, verify_password_blocking};
use super::principal::{AccountView, Principal};
use super::session::{Session, SessionManager};
use super::AuthError;

/// Which identifier a login request is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginScheme {
    Username,
    Email,
    /// Identifiers containing `@` are tried as email first, then as username.
    #[default]
    Either,
}

impl FromStr for LoginScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "username" => Ok(LoginScheme::Username),
            "email" => Ok(LoginScheme::Email),
            "either" | "any" => Ok(LoginScheme::Either),
            other => Err(anyhow::anyhow!("unknown login scheme '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
    pub account: AccountView,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

const MIN_PASSWORD_CHARS: usize = 8;

/// Verifies credentials against the store and issues sessions; also owns
/// account registration.
pub struct Authenticator {
    store: Arc<dyn CatalogStore>,
    sessions: Arc<SessionManager>,
    scheme: LoginScheme,
    read_retries: u32,
    signup_balance: u64,
    /// Hash checked when the login is unknown so both rejection paths pay one Argon2 verify.
    decoy_hash: OnceCell<String>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CatalogStore>, sessions: Arc<SessionManager>, scheme: LoginScheme) -> Self {
        Self { store, sessions, scheme, read_retries: 2, signup_balance: 0, decoy_hash: OnceCell::new() }
    }

    pub fn with_read_retries(mut self, retries: u32) -> Self { self.read_retries = retries; self }

    pub fn with_signup_balance(mut self, balance: u64) -> Self { self.signup_balance = balance; self }

    async fn by_username(&self, login: &str) -> Result<Option<Account>, AuthError> {
        Ok(storage::read_with_retry(self.read_retries, "account_by_username", || self.store.account_by_username(login)).await?)
    }

    async fn by_email(&self, login: &str) -> Result<Option<Account>, AuthError> {
        Ok(storage::read_with_retry(self.read_retries, "account_by_email", || self.store.account_by_email(login)).await?)
    }

    async fn lookup(&self, login: &str) -> Result<Option<Account>, AuthError> {
        match self.scheme {
            LoginScheme::Username => self.by_username(login).await,
            LoginScheme::Email => self.by_email(login).await,
            LoginScheme::Either if login.contains('@') => match self.by_email(login).await? {
                Some(a) => Ok(Some(a)),
                None => self.by_username(login).await,
            },
            LoginScheme::Either => self.by_username(login).await,
        }
    }

    /// Check `login`/`password`; on success persist the login time and issue a session.
    /// Unknown login and wrong password yield the same `InvalidCredentials`.
    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let login = normalize_login(&req.login);
        let Some(mut account) = self.lookup(&login).await? else {
            let decoy = self.decoy_hash().await?;
            let _ = verify_password_blocking(decoy.to_string(), req.password.clone()).await?;
            warn!(login = %login, "auth.login rejected: unknown login");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password_blocking(account.password_hash.clone(), req.password.clone()).await? {
            warn!(account = %account.id, user = %account.username, "auth.login rejected: bad password");
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        self.store.record_login(account.id, now.timestamp_millis())?;
        account.last_login_at = Some(now.timestamp_millis());

        let session = self.sessions.issue_at(Principal::from(&account), now);
        info!(account = %account.id, user = %account.username, "auth.login");
        Ok(LoginResponse { session, account: AccountView::from(&account) })
    }

    /// Build the unknown-login decoy hash ahead of the first request.
    pub async fn prime_decoy(&self) -> Result<(), AuthError> {
        self.decoy_hash().await.map(|_| ())
    }

    async fn decoy_hash(&self) -> Result<&str, AuthError> {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| hash_password_blocking(uuid::Uuid::new_v4().to_string()))
            .await?;
        Ok(hash.as_str())
    }

    /// Fresh client projection of `id`, read with the bounded retry policy.
    pub async fn account_view(&self, id: AccountId) -> Result<AccountView, AuthError> {
        let account = storage::read_with_retry(self.read_retries, "account", || self.store.account(id))
            .await?
            .ok_or(AuthError::UnknownAccount)?;
        Ok(AccountView::from(&account))
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<AccountView, AuthError> {
        self.create_account(req, Role::Member, self.signup_balance).await
    }

    /// Create the bootstrap admin unless an account already holds that username.
    /// Returns true when a new account was created.
    pub async fn ensure_admin(&self, req: &RegisterRequest) -> Result<bool, AuthError> {
        if self.store.account_by_username(&req.username)?.is_some() {
            return Ok(false);
        }
        if let Some(holder) = self.store.account_by_email(&req.email)? {
            return Err(AuthError::UserInput(format!(
                "bootstrap admin email {} already belongs to account '{}'",
                holder.email, holder.username
            )));
        }
        let view = self.create_account(req, Role::Admin, 0).await?;
        info!(account = %view.id, user = %view.username, "bootstrap admin created");
        Ok(true)
    }

    async fn create_account(&self, req: &RegisterRequest, role: Role, balance: u64) -> Result<AccountView, AuthError> {
        let username = normalize_login(&req.username);
        let email = normalize_login(&req.email);
        if username.is_empty() || username.contains('@') || username.chars().any(char::is_whitespace) {
            return Err(AuthError::UserInput("username must be non-empty, without '@' or spaces".into()));
        }
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(AuthError::UserInput("email address is not valid".into()));
        }
        if req.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::UserInput(format!("password must be at least {} characters", MIN_PASSWORD_CHARS)));
        }
        let password_hash = hash_password_blocking(req.password.clone()).await?;
        let account = self.store.insert_account(NewAccount { username, email, password_hash, balance, role })?;
        info!(account = %account.id, user = %account.username, role = role.as_str(), "account registered");
        Ok(AccountView::from(&account))
    }
}
