//! Cookie service: build and clear the portal and gateway cookies.
//!
//! The portal cookie is `portgate_session` on path `/`. Each application
//! gets its own gateway cookie, `portgate_app_{app_id}`, scoped to
//! `/app/{app_id}/` so it is never sent for another application.

use std::time::Duration as StdDuration;

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie name for the portal session.
pub const PORTAL_COOKIE: &str = "portgate_session";

/// Gateway cookie name for one application.
pub fn gateway_cookie_name(app_id: &str) -> String {
    format!("portgate_app_{app_id}")
}

/// Path every gateway route for an application lives under.
pub fn gateway_cookie_path(app_id: &str) -> String {
    format!("/app/{app_id}/")
}

fn max_age(ttl: StdDuration) -> Duration {
    Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

fn build(
    name: String,
    value: String,
    path: String,
    secure: bool,
    age: Duration,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(path)
        .max_age(age)
        .build()
}

/// Build the httpOnly portal session cookie.
pub fn portal_cookie(token: &str, ttl: StdDuration, secure: bool) -> Cookie<'static> {
    build(
        PORTAL_COOKIE.to_string(),
        token.to_string(),
        "/".to_string(),
        secure,
        max_age(ttl),
    )
}

/// Build an expired portal cookie to clear the session.
pub fn clear_portal_cookie(secure: bool) -> Cookie<'static> {
    build(
        PORTAL_COOKIE.to_string(),
        String::new(),
        "/".to_string(),
        secure,
        Duration::ZERO,
    )
}

/// Build the httpOnly gateway cookie for `app_id`.
pub fn gateway_cookie(
    app_id: &str,
    token: &str,
    ttl: StdDuration,
    secure: bool,
) -> Cookie<'static> {
    build(
        gateway_cookie_name(app_id),
        token.to_string(),
        gateway_cookie_path(app_id),
        secure,
        max_age(ttl),
    )
}

/// Build an expired gateway cookie for `app_id`.
pub fn clear_gateway_cookie(app_id: &str, secure: bool) -> Cookie<'static> {
    build(
        gateway_cookie_name(app_id),
        String::new(),
        gateway_cookie_path(app_id),
        secure,
        Duration::ZERO,
    )
}
