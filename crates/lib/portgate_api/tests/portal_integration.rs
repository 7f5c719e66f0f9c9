//! Integration tests: portal router over in-memory and file databases.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::*;
use portgate_core::apps::PUBLIC_GROUP;
use portgate_core::auth::sessions::{DEFAULT_PORTAL_SESSION_TTL, create_session};
use portgate_core::models::auth::Role;

#[tokio::test]
async fn health_reports_database() {
    let state = test_state().await;
    let portal = portgate_api::portal_router(state);

    let resp = send(&portal, empty_request("GET", "/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "portgate-portal");
}

#[tokio::test]
async fn login_sets_http_only_lax_cookie() {
    let state = test_state().await;
    add_user(&state, "alice", Role::User, &["analysts"]).await;
    let portal = portgate_api::portal_router(state);

    let resp = send(
        &portal,
        json_request(
            "POST",
            "/auth/login",
            None,
            serde_json::json!({ "username": "alice", "password": "alice-pw" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let raw = resp
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(raw.starts_with("portgate_session="));
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("SameSite=Lax"));
    assert!(raw.contains("Path=/"));

    let json = body_json(resp).await;
    assert_eq!(json["user"]["username"], "alice");
    assert_eq!(json["user"]["role"], "user");
}

#[tokio::test]
async fn bad_credentials_are_generic() {
    let state = test_state().await;
    add_user(&state, "alice", Role::User, &[]).await;
    let portal = portgate_api::portal_router(state);

    let wrong_password = send(
        &portal,
        json_request(
            "POST",
            "/auth/login",
            None,
            serde_json::json!({ "username": "alice", "password": "nope" }),
        ),
    )
    .await;
    let unknown_user = send(
        &portal,
        json_request(
            "POST",
            "/auth/login",
            None,
            serde_json::json!({ "username": "mallory", "password": "nope" }),
        ),
    )
    .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong_password).await, body_json(unknown_user).await);
}

#[tokio::test]
async fn protected_routes_require_session() {
    let state = test_state().await;
    let portal = portgate_api::portal_router(state);

    let resp = send(&portal, empty_request("GET", "/auth/me", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = send(
        &portal,
        empty_request("GET", "/api/apps", Some("portgate_session=forged")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn second_login_invalidates_first_session() {
    let state = test_state().await;
    add_user(&state, "alice", Role::User, &[]).await;
    let portal = portgate_api::portal_router(state);

    let first = login(&portal, "alice").await;
    let second = login(&portal, "alice").await;

    let resp = send(&portal, empty_request("GET", "/auth/me", Some(&first))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = send(&portal, empty_request("GET", "/auth/me", Some(&second))).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_rotates_cookie() {
    let state = test_state().await;
    add_user(&state, "alice", Role::User, &[]).await;
    let portal = portgate_api::portal_router(state);

    let old = login(&portal, "alice").await;
    let resp = send(&portal, empty_request("POST", "/auth/refresh", Some(&old))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let new = set_cookie(&resp, "portgate_session").unwrap();
    assert_ne!(old, new);

    let resp = send(&portal, empty_request("GET", "/auth/me", Some(&old))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = send(&portal, empty_request("GET", "/auth/me", Some(&new))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let replay = send(&portal, empty_request("POST", "/auth/refresh", Some(&old))).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_cookie_and_session() {
    let state = test_state().await;
    add_user(&state, "alice", Role::User, &[]).await;
    let portal = portgate_api::portal_router(state);

    let cookie = login(&portal, "alice").await;
    let resp = send(&portal, empty_request("POST", "/auth/logout", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        set_cookie(&resp, "portgate_session").as_deref(),
        Some("portgate_session=")
    );

    let resp = send(&portal, empty_request("GET", "/auth/me", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn apps_list_follows_permissions_and_liveness() {
    let state = test_state().await;
    add_user(&state, "alice", Role::User, &["analysts"]).await;
    add_user(&state, "bob", Role::User, &["sales"]).await;
    let (live_port, server) = fake_app().await;
    let down_port = dead_port().await;
    add_app(&state, live_port, "Analytics", &["analysts"]).await;
    add_app(&state, down_port, "Wiki", &[PUBLIC_GROUP]).await;
    let portal = portgate_api::portal_router(state);

    let alice = login(&portal, "alice").await;
    let resp = send(&portal, empty_request("GET", "/api/apps", Some(&alice))).await;
    let json = body_json(resp).await;
    let apps = json["apps"].as_array().unwrap();
    assert_eq!(apps.len(), 2);
    assert_eq!(apps[0]["name"], "Analytics");
    assert_eq!(apps[0]["running"], true);
    assert_eq!(apps[0]["public"], false);
    assert_eq!(apps[1]["name"], "Wiki");
    assert_eq!(apps[1]["running"], false);
    assert_eq!(apps[1]["public"], true);
    assert_eq!(json["runningCount"], 1);

    let bob = login(&portal, "bob").await;
    let json = body_json(send(&portal, empty_request("GET", "/api/apps", Some(&bob))).await).await;
    let names: Vec<&str> = json["apps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Wiki"]);

    let json = body_json(
        send(
            &portal,
            empty_request("GET", "/api/apps?search=analy", Some(&alice)),
        )
        .await,
    )
    .await;
    assert_eq!(json["apps"].as_array().unwrap().len(), 1);
    server.abort();
}

#[tokio::test]
async fn launch_returns_gateway_form_with_hidden_token() {
    let state = test_state().await;
    add_user(&state, "alice", Role::User, &["analysts"]).await;
    let (port, server) = fake_app().await;
    let app_id = add_app(&state, port, "Analytics", &["analysts"]).await;
    let portal = portgate_api::portal_router(state);

    let cookie = login(&portal, "alice").await;
    let resp = send(
        &portal,
        empty_request("POST", &format!("/api/apps/{app_id}/launch"), Some(&cookie)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["action"], format!("{GATEWAY_URL}/launch/{app_id}"));
    assert_eq!(json["method"], "POST");
    assert_eq!(json["fields"]["auth_token"].as_str().unwrap().len(), 64);
    server.abort();
}

#[tokio::test]
async fn launch_refuses_inaccessible_and_stopped_apps() {
    let state = test_state().await;
    add_user(&state, "bob", Role::User, &["sales"]).await;
    let (port, server) = fake_app().await;
    let private = add_app(&state, port, "Analytics", &["analysts"]).await;
    let stopped = add_app(&state, dead_port().await, "Wiki", &[PUBLIC_GROUP]).await;
    let portal = portgate_api::portal_router(state);

    let cookie = login(&portal, "bob").await;
    let resp = send(
        &portal,
        empty_request("POST", &format!("/api/apps/{private}/launch"), Some(&cookie)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(
        &portal,
        empty_request("POST", &format!("/api/apps/{stopped}/launch"), Some(&cookie)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    server.abort();
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let state = test_state().await;
    add_user(&state, "alice", Role::User, &[]).await;
    let portal = portgate_api::portal_router(state);

    let cookie = login(&portal, "alice").await;
    let resp = send(&portal, empty_request("GET", "/admin/users", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_manages_users_and_groups() {
    let state = test_state().await;
    add_user(&state, "root", Role::Admin, &[]).await;
    let portal = portgate_api::portal_router(state);
    let admin = login(&portal, "root").await;

    let resp = send(
        &portal,
        json_request(
            "POST",
            "/admin/users",
            Some(&admin),
            serde_json::json!({
                "username": "carol",
                "password": "carol-pw",
                "fullName": "Carol",
                "groups": ["ops", "analysts"]
            }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let carol = body_json(resp).await;
    assert_eq!(carol["groups"], serde_json::json!(["analysts", "ops"]));
    let carol_id = carol["id"].as_str().unwrap().to_string();

    let duplicate = send(
        &portal,
        json_request(
            "POST",
            "/admin/users",
            Some(&admin),
            serde_json::json!({ "username": "carol", "password": "x" }),
        ),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &portal,
        json_request(
            "PUT",
            &format!("/admin/users/{carol_id}/groups"),
            Some(&admin),
            serde_json::json!({ "groups": ["ops"] }),
        ),
    )
    .await;
    assert_eq!(body_json(resp).await["groups"], serde_json::json!(["ops"]));

    let resp = send(&portal, empty_request("GET", "/admin/groups", Some(&admin))).await;
    let groups = body_json(resp).await;
    assert_eq!(groups["groups"], serde_json::json!(["ops"]));

    let carol_cookie = login(&portal, "carol").await;
    let resp = send(
        &portal,
        json_request(
            "PUT",
            &format!("/admin/users/{carol_id}"),
            Some(&admin),
            serde_json::json!({ "isActive": false }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&portal, empty_request("GET", "/auth/me", Some(&carol_cookie))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = send(
        &portal,
        empty_request("DELETE", &format!("/admin/users/{carol_id}"), Some(&admin)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&portal, empty_request("GET", "/admin/users", Some(&admin))).await;
    let users = body_json(resp).await;
    assert_eq!(users.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_registers_apps_by_port() {
    let state = test_state().await;
    add_user(&state, "root", Role::Admin, &[]).await;
    let portal = portgate_api::portal_router(state);
    let admin = login(&portal, "root").await;

    let first = body_json(
        send(
            &portal,
            json_request(
                "POST",
                "/admin/apps",
                Some(&admin),
                serde_json::json!({ "port": 9001, "name": "Analytics", "groups": ["analysts"] }),
            ),
        )
        .await,
    )
    .await;
    let second = body_json(
        send(
            &portal,
            json_request(
                "POST",
                "/admin/apps",
                Some(&admin),
                serde_json::json!({ "port": 9001, "name": "Analytics v2", "category": "Data" }),
            ),
        )
        .await,
    )
    .await;
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["name"], "Analytics v2");

    let app_id = first["id"].as_str().unwrap().to_string();
    let resp = send(
        &portal,
        json_request(
            "PUT",
            &format!("/admin/apps/{app_id}/permissions"),
            Some(&admin),
            serde_json::json!({ "groups": [PUBLIC_GROUP, "ops"] }),
        ),
    )
    .await;
    assert_eq!(
        body_json(resp).await["groups"],
        serde_json::json!([PUBLIC_GROUP, "ops"])
    );

    let resp = send(&portal, empty_request("GET", "/admin/apps", Some(&admin))).await;
    let apps = body_json(resp).await;
    let apps = apps.as_array().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0]["public"], true);
    assert_eq!(apps[0]["category"], "Data");

    let resp = send(
        &portal,
        empty_request("DELETE", &format!("/admin/apps/{app_id}"), Some(&admin)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(
        &portal,
        empty_request("DELETE", &format!("/admin/apps/{app_id}"), Some(&admin)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_scan_skips_registered_ports() {
    let state = test_state().await;
    add_user(&state, "root", Role::Admin, &[]).await;
    let (registered, s1) = fake_app().await;
    let (unregistered, s2) = fake_app().await;
    add_app(&state, registered, "Known", &[]).await;
    let portal = portgate_api::portal_router(state);
    let admin = login(&portal, "root").await;

    let scan = |port: u16| {
        empty_request(
            "GET",
            &format!("/admin/scan?start={port}&end={port}"),
            Some(&admin),
        )
    };
    let json = body_json(send(&portal, scan(unregistered)).await).await;
    assert_eq!(json["ports"], serde_json::json!([unregistered]));
    let json = body_json(send(&portal, scan(registered)).await).await;
    assert_eq!(json["ports"], serde_json::json!([]));

    let resp = send(
        &portal,
        empty_request("GET", "/admin/scan?start=9000&end=8000", Some(&admin)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = send(
        &portal,
        empty_request("GET", "/admin/scan?start=1000&end=9000", Some(&admin)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    s1.abort();
    s2.abort();
}

#[tokio::test]
async fn login_against_locked_store_denies_within_budget() {
    let (_dir, state) = file_state(Duration::from_millis(500)).await;
    add_user(&state, "alice", Role::User, &[]).await;
    let portal = portgate_api::portal_router(state.clone());

    let lock = hold_write_lock(&state).await;
    let resp = tokio::time::timeout(
        Duration::from_secs(3),
        send(
            &portal,
            json_request(
                "POST",
                "/auth/login",
                None,
                serde_json::json!({ "username": "alice", "password": "alice-pw" }),
            ),
        ),
    )
    .await
    .expect("login answered within the budget");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&resp, "portgate_session").is_none());
    assert_eq!(body_json(resp).await["message"], "Please log in");
    lock.rollback().await.expect("release lock");
}

#[tokio::test]
async fn launch_against_locked_store_denies_within_budget() {
    let (_dir, state) = file_state(Duration::from_millis(500)).await;
    let user_id = add_user(&state, "alice", Role::User, &["analysts"]).await;
    let (port, server) = fake_app().await;
    let app_id = add_app(&state, port, "Analytics", &["analysts"]).await;
    let portal = portgate_api::portal_router(state.clone());
    let token = create_session(&state.pool, &user_id, DEFAULT_PORTAL_SESSION_TTL)
        .await
        .expect("session");
    let session = format!("portgate_session={token}");

    let lock = hold_write_lock(&state).await;
    let resp = tokio::time::timeout(
        Duration::from_secs(3),
        send(
            &portal,
            empty_request("POST", &format!("/api/apps/{app_id}/launch"), Some(&session)),
        ),
    )
    .await
    .expect("launch answered within the budget");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    lock.rollback().await.expect("release lock");
    let resp = send(
        &portal,
        empty_request("POST", &format!("/api/apps/{app_id}/launch"), Some(&session)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    server.abort();
}
