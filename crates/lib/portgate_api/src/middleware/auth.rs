//! Authentication middleware: portal cookie extraction and session check.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use portgate_core::models::auth::SessionUser;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::PORTAL_COOKIE;
use crate::services::portal::authenticate;

/// The validated portal user, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: SessionUser,
    /// Raw portal session token; tokens minted for this request bind to it.
    pub session_token: String,
}

/// Axum middleware: reads the `portgate_session` cookie, validates it and
/// injects [`AuthenticatedUser`] into request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = CookieJar::from_headers(request.headers())
        .get(PORTAL_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(AppError::login_required)?;

    let user = authenticate(&state, &token).await?;
    request.extensions_mut().insert(AuthenticatedUser {
        user,
        session_token: token,
    });
    Ok(next.run(request).await)
}

/// Axum middleware layered inside [`require_session`]: admins only.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<AuthenticatedUser>()
        .is_some_and(|auth| auth.user.role.is_admin());
    if !is_admin {
        debug!(path = %request.uri().path(), "admin route refused");
        return Err(AppError::Forbidden("Access denied".into()));
    }
    Ok(next.run(request).await)
}
