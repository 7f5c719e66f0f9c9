//! Portal application handlers.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{AppsQuery, AppsResponse, LaunchForm};
use crate::services::portal;

/// `GET /api/apps`: applications the user may open, with liveness.
pub async fn list_apps_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<AppsQuery>,
) -> AppResult<Json<AppsResponse>> {
    let resp = portal::accessible_apps(&state, &auth.user, &query).await?;
    Ok(Json(resp))
}

/// `POST /api/apps/{app_id}/launch`: mint an access token and return the
/// gateway form that carries it.
pub async fn launch_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(app_id): Path<String>,
) -> AppResult<Json<LaunchForm>> {
    let form = portal::launch(&state, &auth.user, &auth.session_token, &app_id).await?;
    Ok(Json(form))
}
