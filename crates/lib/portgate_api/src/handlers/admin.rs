//! Admin handlers: users, groups, applications, permissions, port scan.
//!
//! Mounted behind `require_session` and `require_admin`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use portgate_core::apps::queries::{
    all_permissions, delete_application, get_application, list_applications,
    register_application, set_application_permissions,
};
use portgate_core::apps::PUBLIC_GROUP;
use portgate_core::auth::queries::{
    create_user, delete_user, get_user_by_id, get_user_groups, list_groups, list_users,
    set_user_active, set_user_groups, update_user,
};
use portgate_core::auth::sessions::invalidate_user_sessions;
use portgate_core::models::apps::NewApplication;
use portgate_core::models::auth::{NewUser, UserUpdate};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AdminAppView, AdminUserView, AppView, CreateUserRequest, GroupsRequest, GroupsResponse,
    RegisterAppRequest, ScanQuery, ScanResponse, StatusResponse, UpdateUserRequest,
};

/// Widest port range a single scan may cover.
const MAX_SCAN_SPAN: u16 = 2000;

async fn user_view(state: &AppState, user_id: &str) -> AppResult<AdminUserView> {
    let user = get_user_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let groups = get_user_groups(&state.pool, user_id).await?;
    Ok(AdminUserView::new(user, groups))
}

/// `GET /admin/users`
pub async fn list_users_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<AdminUserView>>> {
    let users = list_users(&state.pool).await?;
    let mut views = Vec::with_capacity(users.len());
    for user in users {
        let groups = get_user_groups(&state.pool, &user.id).await?;
        views.push(AdminUserView::new(user, groups));
    }
    Ok(Json(views))
}

/// `POST /admin/users`
pub async fn create_user_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<AdminUserView>)> {
    let user = create_user(
        &state.pool,
        &NewUser {
            username: body.username,
            password: body.password,
            full_name: body.full_name,
            email: body.email,
            role: body.role,
        },
    )
    .await?;
    if !body.groups.is_empty() {
        set_user_groups(&state.pool, &user.id, &body.groups).await?;
    }
    Ok((StatusCode::CREATED, Json(user_view(&state, &user.id).await?)))
}

/// `PUT /admin/users/{user_id}`
pub async fn update_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<AdminUserView>> {
    let update = UserUpdate {
        username: body.username,
        password: body.password,
        full_name: body.full_name,
        email: body.email,
        role: body.role,
    };
    if update.is_empty() && body.is_active.is_none() {
        return Err(AppError::Validation("Nothing to update".into()));
    }
    if !update.is_empty() {
        update_user(&state.pool, &user_id, &update).await?;
    }
    if let Some(active) = body.is_active {
        if !set_user_active(&state.pool, &user_id, active).await? {
            return Err(AppError::NotFound("User not found".into()));
        }
        if !active {
            let ended = invalidate_user_sessions(&state.pool, &user_id).await?;
            info!(user_id, ended, "user deactivated");
        }
    }
    Ok(Json(user_view(&state, &user_id).await?))
}

/// `DELETE /admin/users/{user_id}`
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(user_id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    if auth.user.id == user_id {
        return Err(AppError::Validation("You cannot delete your own account".into()));
    }
    if !delete_user(&state.pool, &user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    Ok(Json(StatusResponse::new("deleted")))
}

/// `PUT /admin/users/{user_id}/groups`
pub async fn set_user_groups_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<GroupsRequest>,
) -> AppResult<Json<GroupsResponse>> {
    set_user_groups(&state.pool, &user_id, &body.groups).await?;
    let groups = get_user_groups(&state.pool, &user_id).await?;
    Ok(Json(GroupsResponse { groups }))
}

/// `GET /admin/groups`
pub async fn list_groups_handler(State(state): State<AppState>) -> AppResult<Json<GroupsResponse>> {
    let groups = list_groups(&state.pool).await?;
    Ok(Json(GroupsResponse { groups }))
}

/// `GET /admin/apps`: every registered application with its permissions.
pub async fn list_apps_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<AdminAppView>>> {
    let apps = list_applications(&state.pool).await?;
    let permissions = all_permissions(&state.pool).await?;
    let ports: Vec<u16> = apps.iter().map(|a| a.port).collect();
    let running = state.prober.probe_many(&ports).await;

    let views = apps
        .iter()
        .map(|app| {
            let groups: Vec<String> = permissions
                .get(&app.id)
                .map(|g| g.iter().cloned().collect())
                .unwrap_or_default();
            let public = groups.iter().any(|g| g == PUBLIC_GROUP);
            AdminAppView {
                app: AppView::new(app, running.get(&app.port).copied().unwrap_or(false), public),
                is_active: app.is_active,
                created_at: app.created_at,
                permissions: groups,
            }
        })
        .collect();
    Ok(Json(views))
}

/// `POST /admin/apps`: register (or re-register) an application by port.
pub async fn register_app_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(body): Json<RegisterAppRequest>,
) -> AppResult<(StatusCode, Json<AppView>)> {
    let mut new_app = NewApplication::new(body.port, &body.name);
    new_app.description = body.description;
    new_app.image_path = body.image_path;
    new_app.category = body.category;
    new_app.created_by = Some(auth.user.id.clone());

    let app = register_application(&state.pool, &new_app).await?;
    if let Some(groups) = &body.groups {
        set_application_permissions(&state.pool, &app.id, groups).await?;
    }
    let public = body
        .groups
        .as_ref()
        .is_some_and(|g| g.iter().any(|g| g.trim() == PUBLIC_GROUP));
    let running = state.prober.probe(app.port).await;
    Ok((StatusCode::CREATED, Json(AppView::new(&app, running, public))))
}

/// `DELETE /admin/apps/{app_id}`
pub async fn delete_app_handler(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    if !delete_application(&state.pool, &app_id).await? {
        return Err(AppError::NotFound("Application not found".into()));
    }
    Ok(Json(StatusResponse::new("deleted")))
}

/// `PUT /admin/apps/{app_id}/permissions`
pub async fn set_app_permissions_handler(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Json(body): Json<GroupsRequest>,
) -> AppResult<Json<GroupsResponse>> {
    if get_application(&state.pool, &app_id).await?.is_none() {
        return Err(AppError::NotFound("Application not found".into()));
    }
    set_application_permissions(&state.pool, &app_id, &body.groups).await?;
    let groups = all_permissions(&state.pool)
        .await?
        .remove(&app_id)
        .map(|g| g.into_iter().collect())
        .unwrap_or_default();
    Ok(Json(GroupsResponse { groups }))
}

/// `GET /admin/scan?start=&end=`: running web services on unregistered
/// ports.
pub async fn scan_handler(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> AppResult<Json<ScanResponse>> {
    if query.start > query.end {
        return Err(AppError::Validation("start must not exceed end".into()));
    }
    if query.end - query.start > MAX_SCAN_SPAN {
        return Err(AppError::Validation(format!(
            "Scan at most {MAX_SCAN_SPAN} ports at a time"
        )));
    }
    let registered: Vec<u16> = list_applications(&state.pool)
        .await?
        .iter()
        .map(|a| a.port)
        .collect();
    let ports = state
        .prober
        .scan_range(query.start, query.end, &registered)
        .await;
    Ok(Json(ScanResponse { ports }))
}
