//! Process configuration. Values come from `RECIPEVAULT_*` environment
//! variables; command-line flags override the environment. The token secret is
//! only accepted from the environment so it never shows up in process lists.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::identity::{LoginScheme, RegisterRequest, MIN_SECRET_LEN};
use crate::unlock::PublicResourcePolicy;

pub const DEFAULT_HTTP_PORT: u16 = 7979;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 3600;

#[derive(Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    /// Snapshot directory; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub token_secret: Vec<u8>,
    pub token_ttl: Duration,
    pub login_scheme: LoginScheme,
    pub public_policy: PublicResourcePolicy,
    pub read_retries: u32,
    pub signup_balance: u64,
    pub admin: Option<RegisterRequest>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_port", &self.http_port)
            .field("data_dir", &self.data_dir)
            .field("token_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("login_scheme", &self.login_scheme)
            .field("public_policy", &self.public_policy)
            .field("read_retries", &self.read_retries)
            .field("signup_balance", &self.signup_balance)
            .field("admin", &self.admin.as_ref().map(|a| a.username.as_str()))
            .finish()
    }
}

impl ServerConfig {
    /// Memory-only configuration with defaults, for embedding and tests.
    pub fn with_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            data_dir: None,
            token_secret: secret.into(),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            login_scheme: LoginScheme::default(),
            public_policy: PublicResourcePolicy::default(),
            read_retries: 2,
            signup_balance: 0,
            admin: None,
        }
    }

    pub fn from_env_and_args(args: &[String]) -> Result<Self> {
        Self::from_sources(args, |k| std::env::var(k).ok())
    }

    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = env("RECIPEVAULT_TOKEN_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("RECIPEVAULT_TOKEN_SECRET must be set"))?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(anyhow!("RECIPEVAULT_TOKEN_SECRET must be at least {} bytes", MIN_SECRET_LEN));
        }
        let mut cfg = Self::with_secret(secret.into_bytes());

        if let Some(port) = flag_value(args, "--http-port").or_else(|| env("RECIPEVAULT_HTTP_PORT")) {
            cfg.http_port = port.parse().with_context(|| format!("invalid http port '{}'", port))?;
        }
        cfg.data_dir = flag_value(args, "--data-dir").or_else(|| env("RECIPEVAULT_DATA_DIR")).map(PathBuf::from);
        if let Some(ttl) = flag_value(args, "--token-ttl").or_else(|| env("RECIPEVAULT_TOKEN_TTL_SECS")) {
            let secs: u64 = ttl.parse().with_context(|| format!("invalid token ttl '{}'", ttl))?;
            if secs == 0 {
                return Err(anyhow!("token ttl must be positive"));
            }
            cfg.token_ttl = Duration::from_secs(secs);
        }
        if let Some(scheme) = flag_value(args, "--login-scheme").or_else(|| env("RECIPEVAULT_LOGIN_SCHEME")) {
            cfg.login_scheme = scheme.parse()?;
        }
        if let Some(policy) = env("RECIPEVAULT_PUBLIC_POLICY") {
            cfg.public_policy = policy.parse()?;
        }
        if let Some(n) = env("RECIPEVAULT_READ_RETRIES") {
            cfg.read_retries = n.parse().with_context(|| format!("invalid read retries '{}'", n))?;
        }
        if let Some(b) = env("RECIPEVAULT_SIGNUP_BALANCE") {
            cfg.signup_balance = b.parse().with_context(|| format!("invalid signup balance '{}'", b))?;
        }
        cfg.admin = match (env("RECIPEVAULT_ADMIN_USER"), env("RECIPEVAULT_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => {
                let email = env("RECIPEVAULT_ADMIN_EMAIL").unwrap_or_else(|| format!("{}@localhost", username));
                Some(RegisterRequest { username, email, password })
            }
            (None, None) => None,
            _ => return Err(anyhow!("RECIPEVAULT_ADMIN_USER and RECIPEVAULT_ADMIN_PASSWORD must be set together")),
        };
        Ok(cfg)
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}
