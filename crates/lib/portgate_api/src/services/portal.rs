//! Portal service: login, the application list, and launch flows
//! delegating to `portgate_core`.

use std::collections::BTreeMap;

use portgate_core::apps::PUBLIC_GROUP;
use portgate_core::apps::filter::{categories, filter_by_category, search_applications};
use portgate_core::apps::queries::{
    all_permissions, get_application, list_accessible_applications, user_can_access,
};
use portgate_core::auth::access_tokens::issue_token;
use portgate_core::auth::queries::verify_password;
use portgate_core::auth::sessions::{create_session, validate_session};
use portgate_core::auth::{AuthError, bounded};
use portgate_core::models::auth::SessionUser;
use tracing::{debug, info};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{AppView, AppsQuery, AppsResponse, LaunchForm};

/// Form field carrying the access token to the gateway.
pub const AUTH_TOKEN_FIELD: &str = "auth_token";

/// A fresh portal session.
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub token: String,
    pub user: SessionUser,
}

/// Check credentials and open a portal session, retiring the user's others.
///
/// Each store call runs under the validation budget; a slow or unreachable
/// store denies the login.
pub async fn login(state: &AppState, username: &str, password: &str) -> AppResult<LoggedIn> {
    let limit = state.config.validation_timeout;
    let user = bounded(limit, verify_password(&state.pool, username.trim(), password))
        .await
        .map_err(AppError::fail_closed)?;
    let token = bounded(
        limit,
        create_session(&state.pool, &user.id, state.config.portal_session_ttl),
    )
    .await
    .map_err(AppError::fail_closed)?;
    let session_user = bounded(limit, validate_session(&state.pool, &token))
        .await
        .map_err(AppError::fail_closed)?
        .ok_or(AuthError::SessionInvalid)?;
    info!(user_id = %user.id, "portal login");
    Ok(LoggedIn {
        token,
        user: session_user,
    })
}

/// Resolve a portal cookie to its user under the validation budget. Any
/// failure, including an unreachable store, reads as "not logged in".
pub async fn authenticate(state: &AppState, token: &str) -> AppResult<SessionUser> {
    bounded(
        state.config.validation_timeout,
        validate_session(&state.pool, token),
    )
    .await
    .map_err(AppError::fail_closed)?
    .ok_or_else(AppError::login_required)
}

/// Applications the user may open, annotated with liveness and public flags.
pub async fn accessible_apps(
    state: &AppState,
    user: &SessionUser,
    query: &AppsQuery,
) -> AppResult<AppsResponse> {
    let visible = list_accessible_applications(&state.pool, &user.id).await?;
    let permissions = all_permissions(&state.pool).await?;
    let all_categories = categories(&visible);

    let mut selected = visible;
    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        selected = filter_by_category(&selected, category);
    }
    if let Some(term) = query.search.as_deref() {
        selected = search_applications(&selected, term);
    }

    let ports: Vec<u16> = selected.iter().map(|a| a.port).collect();
    let running = state.prober.probe_many(&ports).await;

    let apps: Vec<AppView> = selected
        .iter()
        .map(|app| {
            let public = permissions
                .get(&app.id)
                .is_some_and(|groups| groups.contains(PUBLIC_GROUP));
            let is_running = running.get(&app.port).copied().unwrap_or(false);
            AppView::new(app, is_running, public)
        })
        .collect();
    let running_count = apps.iter().filter(|a| a.running).count();

    Ok(AppsResponse {
        apps,
        categories: all_categories,
        running_count,
    })
}

/// Mint an access token for `app_id` bound to the caller's portal session
/// and describe the form that carries it to the gateway. Store calls run
/// under the validation budget and fail closed.
pub async fn launch(
    state: &AppState,
    user: &SessionUser,
    session_token: &str,
    app_id: &str,
) -> AppResult<LaunchForm> {
    let limit = state.config.validation_timeout;
    let app = match bounded(limit, get_application(&state.pool, app_id))
        .await
        .map_err(AppError::fail_closed)?
    {
        Some(app) if app.is_active => app,
        _ => return Err(AuthError::PermissionDenied.into()),
    };
    let allowed = bounded(limit, user_can_access(&state.pool, &user.id, app_id))
        .await
        .map_err(AppError::fail_closed)?;
    if !allowed {
        debug!(user_id = %user.id, app_id, "launch refused: no permission");
        return Err(AuthError::PermissionDenied.into());
    }
    if !state.prober.probe(app.port).await {
        return Err(AppError::Validation("Application is not running".into()));
    }

    let token = bounded(
        limit,
        issue_token(
            &state.pool,
            &user.id,
            app_id,
            session_token,
            state.config.access_token_ttl,
        ),
    )
    .await
    .map_err(AppError::fail_closed)?;

    let mut fields = BTreeMap::new();
    fields.insert(AUTH_TOKEN_FIELD.to_string(), token);
    Ok(LaunchForm {
        action: format!("{}/launch/{app_id}", state.config.gateway_base()),
        method: "POST".into(),
        fields,
    })
}
