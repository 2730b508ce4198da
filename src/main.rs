//!
//! recipevault server binary
//! -------------------------
//! Command-line entry point for the recipe catalog HTTP server. Configuration
//! comes from `RECIPEVAULT_*` environment variables, with flags taking priority.

use std::env;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "recipevault\n\nUSAGE:\n  recipevault [--http-port N] [--data-dir PATH] [--token-ttl SECS] [--login-scheme username|email|either]\n\nOPTIONS:\n  --http-port N        HTTP API port (env: RECIPEVAULT_HTTP_PORT, default 7979)\n  --data-dir PATH      Snapshot directory (env: RECIPEVAULT_DATA_DIR, default memory-only)\n  --token-ttl SECS     Session lifetime (env: RECIPEVAULT_TOKEN_TTL_SECS, default 86400)\n  --login-scheme S     Login identifier (env: RECIPEVAULT_LOGIN_SCHEME, default either)\n\nENVIRONMENT:\n  RECIPEVAULT_TOKEN_SECRET    Required signing secret, at least 32 bytes\n  RECIPEVAULT_PUBLIC_POLICY   free|reject for unlocking already-public menus (default free)\n  RECIPEVAULT_READ_RETRIES    Retries for store reads (default 2)\n  RECIPEVAULT_SIGNUP_BALANCE  Starting xu for new accounts (default 0)\n  RECIPEVAULT_ADMIN_USER / RECIPEVAULT_ADMIN_EMAIL / RECIPEVAULT_ADMIN_PASSWORD\n                              Bootstrap admin account\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = recipevault::config::ServerConfig::from_env_and_args(&args)?;
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "recipevault",
        "recipevault starting: RUST_LOG='{}', http_port={}, data_dir={:?}, login_scheme={:?}, public_policy={:?}",
        rust_log, config.http_port, config.data_dir, config.login_scheme, config.public_policy
    );

    recipevault::server::run(config).await
}
