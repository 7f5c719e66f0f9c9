//! Shared helpers for router integration tests.

#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use portgate_api::{AppState, config::ApiConfig};
use portgate_core::apps::queries::{register_application, set_application_permissions};
use portgate_core::auth::queries::{create_user, set_user_groups};
use portgate_core::db::{connect, memory_pool};
use portgate_core::models::apps::NewApplication;
use portgate_core::models::auth::{NewUser, Role};
use sqlx::{Sqlite, Transaction};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const GATEWAY_URL: &str = "http://gateway.test:8000";
pub const PORTAL_URL: &str = "http://portal.test:8501";

pub async fn test_state() -> AppState {
    let pool = memory_pool().await.expect("memory pool");
    let config = ApiConfig {
        gateway_public_url: GATEWAY_URL.into(),
        portal_public_url: PORTAL_URL.into(),
        app_host: "127.0.0.1".into(),
        ..Default::default()
    };
    AppState::new(pool, config).expect("state")
}

/// State over a file database, where a writer on one connection really
/// blocks writers on the others. Store calls get `validation_timeout`.
pub async fn file_state(validation_timeout: Duration) -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("portgate.db").display());
    let pool = connect(&url, 5).await.expect("file pool");
    let config = ApiConfig {
        gateway_public_url: GATEWAY_URL.into(),
        portal_public_url: PORTAL_URL.into(),
        app_host: "127.0.0.1".into(),
        validation_timeout,
        ..Default::default()
    };
    (dir, AppState::new(pool, config).expect("state"))
}

/// Take SQLite's write lock and keep it until the transaction drops.
pub async fn hold_write_lock(state: &AppState) -> Transaction<'static, Sqlite> {
    let mut tx = state.pool.begin().await.expect("begin");
    sqlx::query("UPDATE users SET is_active = is_active")
        .execute(&mut *tx)
        .await
        .expect("take write lock");
    tx
}

pub async fn add_user(state: &AppState, username: &str, role: Role, groups: &[&str]) -> String {
    let user = create_user(
        &state.pool,
        &NewUser {
            username: username.into(),
            password: format!("{username}-pw"),
            full_name: username.to_uppercase(),
            role,
            ..Default::default()
        },
    )
    .await
    .expect("create user");
    let groups: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
    set_user_groups(&state.pool, &user.id, &groups)
        .await
        .expect("set groups");
    user.id
}

pub async fn add_app(state: &AppState, port: u16, name: &str, groups: &[&str]) -> String {
    let app = register_application(&state.pool, &NewApplication::new(port, name))
        .await
        .expect("register app");
    let groups: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
    set_application_permissions(&state.pool, &app.id, &groups)
        .await
        .expect("set permissions");
    app.id
}

/// Serve `200 OK` on an ephemeral localhost port until the handle is
/// aborted.
pub async fn fake_app() -> (u16, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let handle = tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (port, handle)
}

/// A port nothing listens on.
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}

pub fn json_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("encode")))
        .expect("request")
}

pub fn empty_request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::empty()).expect("request")
}

pub fn form_request(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .expect("request")
}

pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.expect("response")
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(resp).await).expect("parse JSON")
}

/// The `name=value` pair of the first `Set-Cookie` header named `name`.
pub fn set_cookie(resp: &Response<Body>, name: &str) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Log in through the portal router and return the `portgate_session=...`
/// cookie pair.
pub async fn login(portal: &Router, username: &str) -> String {
    let resp = send(
        portal,
        json_request(
            "POST",
            "/auth/login",
            None,
            serde_json::json!({ "username": username, "password": format!("{username}-pw") }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK, "login for {username}");
    set_cookie(&resp, "portgate_session").expect("session cookie")
}
