//! Gateway handlers: launch, serve, refresh, sign-out and iframe validation.
//!
//! Failures render the fixed denial page; which check failed is only
//! logged.

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use axum_extra::extract::cookie::CookieJar;
use portgate_core::apps::queries::get_application;
use portgate_core::auth::bounded;
use portgate_core::gateway::{IframeRejection, IframeValidation};
use tracing::{debug, info, warn};

use crate::AppState;
use crate::models::{LaunchParams, StatusResponse};
use crate::pages::{denied_page, frame_page};
use crate::services::cookies::{
    clear_gateway_cookie, gateway_cookie, gateway_cookie_name, gateway_cookie_path,
};

const LAUNCH_DENIED: &str =
    "This access link is invalid or has expired. Launch the application again from the portal.";
const SESSION_DENIED: &str =
    "Your session for this application is missing or has expired. Launch it again from the portal.";

fn denied(state: &AppState, reason: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CACHE_CONTROL, "no-store")],
        Html(denied_page(reason, state.config.portal_base())),
    )
        .into_response()
}

fn gateway_token(jar: &CookieJar, app_id: &str) -> Option<String> {
    jar.get(&gateway_cookie_name(app_id))
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

async fn launch(
    state: AppState,
    jar: CookieJar,
    app_id: String,
    token: Option<String>,
) -> Response {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        debug!(app_id, "launch without token");
        return denied(&state, LAUNCH_DENIED);
    };

    let result = state
        .gateway
        .launch(&state.pool, &token, &app_id, state.config.validation_timeout)
        .await;
    match result {
        Ok(cookie_value) => {
            let cookie = gateway_cookie(
                &app_id,
                &cookie_value,
                state.gateway.session_ttl(),
                state.config.cookie_secure,
            );
            info!(app_id, "gateway launch accepted");
            (jar.add(cookie), Redirect::to(&gateway_cookie_path(&app_id))).into_response()
        }
        Err(e) => {
            if e.is_unavailable() {
                warn!(app_id, error = %e, "gateway launch failed closed");
            } else {
                info!(app_id, error = %e, "gateway launch denied");
            }
            denied(&state, LAUNCH_DENIED)
        }
    }
}

/// `POST /launch/{app_id}`: form field `auth_token`.
pub async fn launch_form_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(app_id): Path<String>,
    Form(params): Form<LaunchParams>,
) -> Response {
    launch(state, jar, app_id, params.auth_token).await
}

/// `GET /launch/{app_id}?auth_token=`: answered with a redirect so the
/// token never stays in the address bar.
pub async fn launch_query_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(app_id): Path<String>,
    Query(params): Query<LaunchParams>,
) -> Response {
    launch(state, jar, app_id, params.auth_token).await
}

/// `GET /app/{app_id}`: normalise to the cookie path.
pub async fn app_redirect_handler(Path(app_id): Path<String>) -> Redirect {
    Redirect::to(&gateway_cookie_path(&app_id))
}

/// `GET /app/{app_id}/`: serve the framed application for a live gateway
/// session.
pub async fn serve_app_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(app_id): Path<String>,
) -> Response {
    let Some(cookie) = gateway_token(&jar, &app_id) else {
        return denied(&state, SESSION_DENIED);
    };
    let limit = state.config.validation_timeout;

    let session = match bounded(limit, state.gateway.authorize(&cookie, &app_id)).await {
        Ok(Some(session)) => session,
        Ok(None) => return denied(&state, SESSION_DENIED),
        Err(e) => {
            warn!(app_id, error = %e, "gateway session check failed closed");
            return denied(&state, SESSION_DENIED);
        }
    };

    let app = match bounded(limit, get_application(&state.pool, &app_id)).await {
        Ok(Some(app)) if app.is_active => app,
        Ok(_) => {
            debug!(app_id, "gateway session for missing or disabled app");
            return denied(&state, SESSION_DENIED);
        }
        Err(e) => {
            warn!(app_id, error = %e, "application lookup failed closed");
            return denied(&state, SESSION_DENIED);
        }
    };

    let iframe_token = match state.gateway.mint_iframe_token(&session).await {
        Ok(token) => token,
        Err(e) => {
            warn!(app_id, error = %e, "iframe token mint failed");
            return denied(&state, SESSION_DENIED);
        }
    };

    let frame_src = format!(
        "http://{}:{}/?portal_session={iframe_token}",
        state.config.app_host, app.port
    );
    let refresh_path = format!("{}refresh-session", gateway_cookie_path(&app_id));
    (
        [(header::CACHE_CONTROL, "no-store")],
        Html(frame_page(
            &app.name,
            &frame_src,
            state.config.portal_base(),
            &refresh_path,
        )),
    )
        .into_response()
}

/// `POST /app/{app_id}/refresh-session`: slide the gateway session expiry.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(app_id): Path<String>,
) -> (StatusCode, Json<StatusResponse>) {
    let invalid = (StatusCode::UNAUTHORIZED, Json(StatusResponse::new("invalid")));
    let Some(cookie) = gateway_token(&jar, &app_id) else {
        return invalid;
    };
    match bounded(
        state.config.validation_timeout,
        state.gateway.refresh(&cookie, &app_id),
    )
    .await
    {
        Ok(true) => (StatusCode::OK, Json(StatusResponse::new("refreshed"))),
        Ok(false) => invalid,
        Err(e) => {
            warn!(app_id, error = %e, "gateway refresh failed closed");
            invalid
        }
    }
}

/// `POST /app/{app_id}/sign-out`: end the gateway session and clear its
/// cookie. The cookie is cleared even when the session is already gone.
pub async fn sign_out_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(app_id): Path<String>,
) -> (CookieJar, Json<StatusResponse>) {
    if let Some(cookie) = gateway_token(&jar, &app_id) {
        match bounded(state.config.validation_timeout, state.gateway.revoke(&cookie)).await {
            Ok(existed) => info!(app_id, existed, "gateway session signed out"),
            Err(e) => warn!(app_id, error = %e, "gateway sign-out failed"),
        }
    }
    let jar = jar.add(clear_gateway_cookie(&app_id, state.config.cookie_secure));
    (jar, Json(StatusResponse::new("signed-out")))
}

/// `GET /validate-session/{app_id}/{token}`: single-use iframe check.
pub async fn validate_session_handler(
    State(state): State<AppState>,
    Path((app_id, token)): Path<(String, String)>,
) -> Json<IframeValidation> {
    let outcome = bounded(
        state.config.validation_timeout,
        state.gateway.validate_iframe_token(&token, &app_id),
    )
    .await
    .unwrap_or_else(|e| {
        warn!(app_id, error = %e, "iframe validation failed closed");
        IframeValidation::Invalid {
            valid: false,
            reason: IframeRejection::NotFound.reason(),
        }
    });
    Json(outcome)
}
