//!
//! recipevault HTTP server
//! -----------------------
//! Axum routes for the recipe catalog.
//!
//! Responsibilities:
//! - Login and registration backed by the `identity` module.
//! - An explicit authorization step at the top of every protected handler:
//!   `authorize` resolves the `Authorization` header to a `RequestContext` or
//!   rejects the request before any handler logic runs.
//! - Purchase, unlock status, menu reads and the account library via `unlock`.
//! - Admin-only menu creation and balance credit.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::catalog::Catalog;
use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{
    Authenticator, IdentityResolver, LoginRequest, RegisterRequest, RequestContext, SessionManager, TokenCodec,
};
use crate::storage::{CatalogStore, NewResource, SharedStore};
use crate::unlock::Purchaser;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub auth: Arc<Authenticator>,
    pub resolver: Arc<IdentityResolver>,
    pub purchases: Arc<Purchaser>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    /// Wire the core components over `store` using `config`.
    pub fn new(store: Arc<dyn CatalogStore>, config: &ServerConfig) -> anyhow::Result<Self> {
        let codec = TokenCodec::new(&config.token_secret).context("building token codec")?;
        let sessions = Arc::new(SessionManager::new(codec, config.token_ttl));
        let auth = Authenticator::new(store.clone(), sessions.clone(), config.login_scheme)
            .with_read_retries(config.read_retries)
            .with_signup_balance(config.signup_balance);
        let resolver = IdentityResolver::new(store.clone(), sessions).with_read_retries(config.read_retries);
        let purchases = Purchaser::new(store.clone(), config.public_policy).with_read_retries(config.read_retries);
        Ok(Self {
            catalog: Arc::new(Catalog::new(store.clone())),
            store,
            auth: Arc::new(auth),
            resolver: Arc::new(resolver),
            purchases: Arc::new(purchases),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "recipevault ok" }))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/me/unlocks", get(my_unlocks))
        .route("/menus/{id}", get(menu))
        .route("/menus/{id}/unlocked", get(unlock_status))
        .route("/menus/{id}/unlock", post(unlock))
        .route("/admin/menus", post(create_menu))
        .route("/admin/accounts/{id}/credit", post(credit))
        .fallback(|| async { AppError::not_found("route_not_found", "no such route") })
        .with_state(state)
}

/// Open the store, bootstrap the admin account if configured, and serve HTTP.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = match &config.data_dir {
        Some(dir) => {
            info!(target: "startup", data_dir = %dir.display(), "opening snapshot store");
            SharedStore::open(dir).with_context(|| format!("While opening store under {}", dir.display()))?
        }
        None => {
            info!(target: "startup", "no data dir configured; state is memory-only");
            SharedStore::in_memory()
        }
    };
    let state = AppState::new(Arc::new(store), &config)?;

    if let Some(admin) = &config.admin {
        state
            .auth
            .ensure_admin(admin)
            .await
            .map_err(|e| anyhow::anyhow!("While ensuring bootstrap admin: {}", e))?;
    }

    state
        .auth
        .prime_decoy()
        .await
        .map_err(|e| anyhow::anyhow!("While preparing login verifier: {}", e))?;

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Resolve the caller or reject the whole request.
async fn authorize(state: &AppState, headers: &HeaderMap) -> AppResult<RequestContext> {
    let raw = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    Ok(state.resolver.resolve(raw).await?)
}

async fn authorize_admin(state: &AppState, headers: &HeaderMap) -> AppResult<RequestContext> {
    let ctx = authorize(state, headers).await?;
    if !ctx.principal.is_admin() {
        return Err(AppError::forbidden("forbidden", "admin role required"));
    }
    Ok(ctx)
}

fn parse_id(raw: &str, code: &str, what: &str) -> AppResult<uuid::Uuid> {
    uuid::Uuid::parse_str(raw).map_err(|_| AppError::not_found(code.to_string(), format!("{} not found", what)))
}

/// `Json` with rejections folded into `AppError`.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

#[derive(Debug, Deserialize)]
struct LoginPayload { login: String, password: String }

#[derive(Debug, Deserialize)]
struct RegisterPayload { username: String, email: String, password: String }

#[derive(Debug, Deserialize)]
struct CreditPayload { amount: u64 }

async fn register(State(state): State<AppState>, ApiJson(payload): ApiJson<RegisterPayload>) -> AppResult<Json<serde_json::Value>> {
    let req = RegisterRequest { username: payload.username, email: payload.email, password: payload.password };
    let account = state.auth.register(&req).await?;
    Ok(Json(json!({"status":"ok","account": account})))
}

async fn login(State(state): State<AppState>, ApiJson(payload): ApiJson<LoginPayload>) -> AppResult<Json<serde_json::Value>> {
    let req = LoginRequest { login: payload.login, password: payload.password };
    let resp = state.auth.login(&req).await?;
    Ok(Json(json!({
        "status": "ok",
        "token": resp.session.token,
        "expires_at": resp.session.expires_at.to_rfc3339(),
        "account": resp.account,
    })))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    let ctx = authorize(&state, &headers).await?;
    let account = state.auth.account_view(ctx.principal.account_id).await?;
    Ok(Json(json!({"status":"ok","account": account})))
}

async fn my_unlocks(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    let ctx = authorize(&state, &headers).await?;
    let grants = state.purchases.unlocked_resources(ctx.principal.account_id).await?;
    Ok(Json(json!({"status":"ok","unlocks": grants})))
}

async fn menu(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let ctx = authorize(&state, &headers).await?;
    let rid = parse_id(&id, "resource_not_found", "menu")?;
    let view = state.purchases.menu_view(ctx.principal.account_id, rid).await?;
    Ok(Json(json!({"status":"ok","menu": view})))
}

async fn unlock_status(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let ctx = authorize(&state, &headers).await?;
    let rid = parse_id(&id, "resource_not_found", "menu")?;
    let unlocked = state.purchases.is_unlocked(ctx.principal.account_id, rid).await?;
    Ok(Json(json!({"status":"ok","unlocked": unlocked})))
}

async fn unlock(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let ctx = authorize(&state, &headers).await?;
    let rid = parse_id(&id, "resource_not_found", "menu")?;
    let receipt = state.purchases.purchase(ctx.principal.account_id, rid).await?;
    Ok(Json(json!({"status":"ok","balance": receipt.new_balance,"charged": receipt.charged})))
}

async fn create_menu(State(state): State<AppState>, headers: HeaderMap, ApiJson(payload): ApiJson<NewResource>) -> AppResult<Json<serde_json::Value>> {
    authorize_admin(&state, &headers).await?;
    let menu = state.catalog.create_menu(payload)?;
    Ok(Json(json!({"status":"ok","menu": menu})))
}

async fn credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<CreditPayload>,
) -> AppResult<Json<serde_json::Value>> {
    authorize_admin(&state, &headers).await?;
    let aid = parse_id(&id, "account_not_found", "account")?;
    let balance = state.catalog.credit(aid, payload.amount)?;
    Ok(Json(json!({"status":"ok","balance": balance})))
}
