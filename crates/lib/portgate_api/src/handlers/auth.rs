//! Portal authentication request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use portgate_core::auth::bounded;
use portgate_core::auth::sessions::{invalidate_session, refresh_session, validate_session};
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{LoginRequest, SessionResponse, StatusResponse};
use crate::services::cookies::{PORTAL_COOKIE, clear_portal_cookie, portal_cookie};
use crate::services::portal;

fn portal_token(jar: &CookieJar) -> Option<String> {
    jar.get(PORTAL_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// `POST /auth/login`: check credentials and set the portal cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let logged_in = portal::login(&state, &body.username, &body.password).await?;
    let cookie = portal_cookie(
        &logged_in.token,
        state.config.portal_session_ttl,
        state.config.cookie_secure,
    );
    Ok((jar.add(cookie), Json(SessionResponse::from(&logged_in.user))))
}

/// `POST /auth/logout`: invalidate the session and clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<StatusResponse>) {
    if let Some(token) = portal_token(&jar) {
        match invalidate_session(&state.pool, &token).await {
            Ok(()) => info!("portal logout"),
            Err(e) => warn!(error = %e, "logout could not invalidate session"),
        }
    }
    (
        jar.add(clear_portal_cookie(state.config.cookie_secure)),
        Json(StatusResponse::new("logged_out")),
    )
}

/// `POST /auth/refresh`: keep-alive. Reissue the session and replace the
/// cookie. The old token stops working.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let old = portal_token(&jar).ok_or_else(AppError::login_required)?;
    let limit = state.config.validation_timeout;

    let token = bounded(
        limit,
        refresh_session(&state.pool, &old, state.config.portal_session_ttl),
    )
    .await
    .map_err(AppError::fail_closed)?;
    let user = bounded(limit, validate_session(&state.pool, &token))
        .await
        .map_err(AppError::fail_closed)?
        .ok_or_else(AppError::login_required)?;

    let cookie = portal_cookie(
        &token,
        state.config.portal_session_ttl,
        state.config.cookie_secure,
    );
    Ok((jar.add(cookie), Json(SessionResponse::from(&user))))
}

/// `GET /auth/me`: the logged-in user.
pub async fn me_handler(Extension(auth): Extension<AuthenticatedUser>) -> Json<SessionResponse> {
    Json(SessionResponse::from(&auth.user))
}
