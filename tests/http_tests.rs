//! HTTP surface tests driven through the axum router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use recipevault::config::ServerConfig;
use recipevault::identity::{RegisterRequest, TokenCodec};
use recipevault::server::{router, AppState};
use recipevault::storage::{CatalogStore, Role, SharedStore};

const SECRET: &str = "http-test-secret-0123456789abcdef";

async fn setup() -> Result<(Router, SharedStore)> {
    let store = SharedStore::in_memory();
    let mut cfg = ServerConfig::with_secret(SECRET);
    cfg.signup_balance = 150;
    let state = AppState::new(Arc::new(store.clone()), &cfg)?;
    let admin = RegisterRequest { username: "admin".into(), email: "admin@example.com".into(), password: "admin-password".into() };
    state.auth.ensure_admin(&admin).await?;
    Ok((router(state), store))
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, t);
    }
    let req = match body {
        Some(b) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(b.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    Ok((status, value))
}

async fn login(app: &Router, login: &str, password: &str) -> Result<String> {
    let (status, body) = call(app, "POST", "/login", None, Some(json!({"login": login, "password": password}))).await?;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    Ok(body["token"].as_str().unwrap_or_default().to_string())
}

async fn create_menu(app: &Router, admin_token: &str, price: u64, public: bool) -> Result<String> {
    let (status, body) = call(
        app,
        "POST",
        "/admin/menus",
        Some(&format!("Bearer {}", admin_token)),
        Some(json!({"name": "Bun bo Hue", "summary": "spicy", "body": "lemongrass broth", "unlock_price": price, "default_accessible": public})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "create menu failed: {body}");
    Ok(body["menu"]["id"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn register_login_unlock_flow() -> Result<()> {
    let (app, _) = setup().await?;
    let admin = login(&app, "admin", "admin-password").await?;
    let menu = create_menu(&app, &admin, 100, false).await?;

    let (status, body) = call(
        &app,
        "POST",
        "/register",
        None,
        Some(json!({"username": "Lan", "email": "lan@example.com", "password": "lan-password"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"]["balance"], 150);

    let token = login(&app, "lan", "lan-password").await?;
    let bearer = format!("Bearer {}", token);

    let (_, body) = call(&app, "GET", &format!("/menus/{}", menu), Some(&bearer), None).await?;
    assert_eq!(body["menu"]["locked"], true);
    assert_eq!(body["menu"]["body"], Value::Null);

    let (status, body) = call(&app, "POST", &format!("/menus/{}/unlock", menu), Some(&bearer), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 50);
    assert_eq!(body["charged"], 100);

    // bare token without the Bearer prefix is accepted too
    let (_, body) = call(&app, "GET", &format!("/menus/{}/unlocked", menu), Some(&token), None).await?;
    assert_eq!(body["unlocked"], true);

    let (_, body) = call(&app, "GET", &format!("/menus/{}", menu), Some(&bearer), None).await?;
    assert_eq!(body["menu"]["body"], "lemongrass broth");

    let (status, body) = call(&app, "POST", &format!("/menus/{}/unlock", menu), Some(&bearer), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_purchased");

    let (_, body) = call(&app, "GET", "/me", Some(&bearer), None).await?;
    assert_eq!(body["account"]["balance"], 50);

    let (_, body) = call(&app, "GET", "/me/unlocks", Some(&bearer), None).await?;
    assert_eq!(body["unlocks"].as_array().map(|a| a.len()), Some(1));
    Ok(())
}

#[tokio::test]
async fn insufficient_balance_is_machine_distinguishable() -> Result<()> {
    let (app, _) = setup().await?;
    let admin = login(&app, "admin", "admin-password").await?;
    let menu = create_menu(&app, &admin, 500, false).await?;
    call(&app, "POST", "/register", None, Some(json!({"username": "lan", "email": "lan@example.com", "password": "lan-password"}))).await?;
    let token = login(&app, "lan", "lan-password").await?;

    let (status, body) = call(&app, "POST", &format!("/menus/{}/unlock", menu), Some(&token), None).await?;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "insufficient_balance");
    assert_eq!(body["status"], "error");

    let (_, body) = call(&app, "GET", "/me", Some(&token), None).await?;
    assert_eq!(body["account"]["balance"], 150);
    Ok(())
}

#[tokio::test]
async fn wrong_password_gets_no_token() -> Result<()> {
    let (app, _) = setup().await?;
    let (status, body) = call(&app, "POST", "/login", None, Some(json!({"login": "admin", "password": "nope-nope"}))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");
    assert!(body.get("token").is_none());
    Ok(())
}

#[tokio::test]
async fn expired_token_rejected_before_handler() -> Result<()> {
    let (app, store) = setup().await?;
    let admin = login(&app, "admin", "admin-password").await?;
    let menu = create_menu(&app, &admin, 10, false).await?;
    call(&app, "POST", "/register", None, Some(json!({"username": "lan", "email": "lan@example.com", "password": "lan-password"}))).await?;
    let lan = store.account_by_username("lan")?.unwrap();

    let codec = TokenCodec::new(SECRET.as_bytes())?;
    let expired = codec.sign_for(lan.id, Role::Member, Utc::now() - chrono::Duration::hours(1));
    let (status, body) = call(&app, "POST", &format!("/menus/{}/unlock", menu), Some(&format!("Bearer {}", expired)), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "token_expired");
    assert_eq!(store.account(lan.id)?.unwrap().balance, 150);
    assert!(store.grants_for(lan.id)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_token_and_non_admin_rejections() -> Result<()> {
    let (app, _) = setup().await?;
    let (status, body) = call(&app, "GET", "/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "missing_token");

    call(&app, "POST", "/register", None, Some(json!({"username": "lan", "email": "lan@example.com", "password": "lan-password"}))).await?;
    let token = login(&app, "lan@example.com", "lan-password").await?;
    let (status, body) = call(
        &app,
        "POST",
        "/admin/menus",
        Some(&token),
        Some(json!({"name": "x", "unlock_price": 1})),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
    Ok(())
}

#[tokio::test]
async fn admin_credit_and_unknown_ids() -> Result<()> {
    let (app, store) = setup().await?;
    let admin = login(&app, "admin", "admin-password").await?;
    call(&app, "POST", "/register", None, Some(json!({"username": "lan", "email": "lan@example.com", "password": "lan-password"}))).await?;
    let lan = store.account_by_username("lan")?.unwrap();

    let (status, body) = call(&app, "POST", &format!("/admin/accounts/{}/credit", lan.id), Some(&admin), Some(json!({"amount": 25}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 175);

    let (status, body) = call(&app, "GET", "/menus/not-a-uuid", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "resource_not_found");

    let (status, body) = call(&app, "GET", &format!("/menus/{}/unlocked", uuid::Uuid::new_v4()), Some(&admin), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "resource_not_found");
    Ok(())
}

#[tokio::test]
async fn public_menu_unlock_is_free() -> Result<()> {
    let (app, _) = setup().await?;
    let admin = login(&app, "admin", "admin-password").await?;
    let menu = create_menu(&app, &admin, 100, true).await?;
    call(&app, "POST", "/register", None, Some(json!({"username": "lan", "email": "lan@example.com", "password": "lan-password"}))).await?;
    let token = login(&app, "lan", "lan-password").await?;

    let (status, body) = call(&app, "POST", &format!("/menus/{}/unlock", menu), Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["charged"], 0);
    assert_eq!(body["balance"], 150);
    let (_, body) = call(&app, "GET", &format!("/menus/{}", menu), Some(&token), None).await?;
    assert_eq!(body["menu"]["locked"], false);
    Ok(())
}

async fn raw_post(app: &Router, uri: &str, content_type: Option<&str>, body: &str) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }
    let resp = app.clone().oneshot(builder.body(Body::from(body.to_string()))?).await?;
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn bad_bodies_answer_with_json_errors() -> Result<()> {
    let (app, _) = setup().await?;

    let (status, body) = raw_post(&app, "/login", Some("application/json"), "{not json").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "invalid_body");
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

    let (status, body) = raw_post(&app, "/login", None, r#"{"login":"admin","password":"admin-password"}"#).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "unsupported_content_type");

    let (status, body) = raw_post(&app, "/login", Some("application/json"), r#"{"login":"admin"}"#).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_body");
    assert!(body["message"].as_str().is_some_and(|m| m.contains("password")));
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_json_not_found() -> Result<()> {
    let (app, _) = setup().await?;
    let (status, body) = call(&app, "GET", "/recipes/everything", None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "route_not_found");
    Ok(())
}
