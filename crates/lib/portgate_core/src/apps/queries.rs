//! Application registry and permission queries.

use sqlx::SqlitePool;
use tracing::info;

use super::PUBLIC_GROUP;
use super::filter::{PermissionMap, is_visible, visible_applications};
use crate::auth::AuthError;
use crate::auth::queries::{get_user_by_id, get_user_groups, normalize_groups};
use crate::clock::{from_millis, now_millis};
use crate::models::apps::{Application, DEFAULT_CATEGORY, NewApplication};
use crate::uuid::new_id;

const APP_COLUMNS: &str =
    "id, port, name, description, image_path, category, is_active, created_at, created_by";

type AppRow = (
    String,
    i64,
    String,
    String,
    Option<String>,
    String,
    bool,
    i64,
    Option<String>,
);

fn app_from_row(row: AppRow) -> Result<Application, AuthError> {
    let (id, port, name, description, image_path, category, is_active, created_at, created_by) =
        row;
    Ok(Application {
        id,
        port: u16::try_from(port)
            .map_err(|_| AuthError::Internal(format!("stored port {port} out of range")))?,
        name,
        description,
        image_path,
        category,
        is_active,
        created_at: from_millis(created_at),
        created_by,
    })
}

/// Register an application on a port. Registering a port that is already
/// known updates and reactivates the existing record, keeping its id.
pub async fn register_application(
    pool: &SqlitePool,
    new_app: &NewApplication,
) -> Result<Application, AuthError> {
    if new_app.port == 0 {
        return Err(AuthError::ValidationError("Port must be non-zero".into()));
    }
    let name = new_app.name.trim();
    if name.is_empty() {
        return Err(AuthError::ValidationError("Application name is required".into()));
    }
    let category = match new_app.category.trim() {
        "" => DEFAULT_CATEGORY,
        c => c,
    };

    sqlx::query(
        "INSERT INTO apps \
         (id, port, name, description, image_path, category, is_active, created_at, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $8) \
         ON CONFLICT (port) DO UPDATE SET \
           name = excluded.name, \
           description = excluded.description, \
           image_path = excluded.image_path, \
           category = excluded.category, \
           is_active = 1",
    )
    .bind(new_id())
    .bind(i64::from(new_app.port))
    .bind(name)
    .bind(&new_app.description)
    .bind(new_app.image_path.as_deref())
    .bind(category)
    .bind(now_millis())
    .bind(new_app.created_by.as_deref())
    .execute(pool)
    .await?;

    let app = get_application_by_port(pool, new_app.port)
        .await?
        .ok_or_else(|| AuthError::Internal("application vanished after upsert".into()))?;
    info!(app_id = %app.id, port = app.port, name = %app.name, "application registered");
    Ok(app)
}

/// Fetch an application by id.
pub async fn get_application(
    pool: &SqlitePool,
    app_id: &str,
) -> Result<Option<Application>, AuthError> {
    let sql = format!("SELECT {APP_COLUMNS} FROM apps WHERE id = $1");
    let row = sqlx::query_as::<_, AppRow>(&sql)
        .bind(app_id)
        .fetch_optional(pool)
        .await?;
    row.map(app_from_row).transpose()
}

/// Fetch an application by port.
pub async fn get_application_by_port(
    pool: &SqlitePool,
    port: u16,
) -> Result<Option<Application>, AuthError> {
    let sql = format!("SELECT {APP_COLUMNS} FROM apps WHERE port = $1");
    let row = sqlx::query_as::<_, AppRow>(&sql)
        .bind(i64::from(port))
        .fetch_optional(pool)
        .await?;
    row.map(app_from_row).transpose()
}

/// List every application, ordered by name.
pub async fn list_applications(pool: &SqlitePool) -> Result<Vec<Application>, AuthError> {
    let sql = format!("SELECT {APP_COLUMNS} FROM apps ORDER BY name, id");
    let rows = sqlx::query_as::<_, AppRow>(&sql).fetch_all(pool).await?;
    rows.into_iter().map(app_from_row).collect()
}

/// Enable or disable an application.
pub async fn set_application_active(
    pool: &SqlitePool,
    app_id: &str,
    active: bool,
) -> Result<bool, AuthError> {
    let result = sqlx::query("UPDATE apps SET is_active = $1 WHERE id = $2")
        .bind(active)
        .bind(app_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete an application with its permission rows and outstanding tokens.
pub async fn delete_application(pool: &SqlitePool, app_id: &str) -> Result<bool, AuthError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM app_permissions WHERE app_id = $1")
        .bind(app_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM access_tokens WHERE app_id = $1")
        .bind(app_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM apps WHERE id = $1")
        .bind(app_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        info!(app_id, "application deleted");
    }
    Ok(deleted)
}

/// Replace the set of groups allowed to open an application. Include
/// [`PUBLIC_GROUP`] to open it to everyone.
pub async fn set_application_permissions(
    pool: &SqlitePool,
    app_id: &str,
    groups: &[String],
) -> Result<(), AuthError> {
    let groups = normalize_groups(groups);

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM app_permissions WHERE app_id = $1")
        .bind(app_id)
        .execute(&mut *tx)
        .await?;

    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM apps WHERE id = $1)")
        .bind(app_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Err(AuthError::ValidationError("Unknown application".into()));
    }

    for group in &groups {
        sqlx::query("INSERT INTO app_permissions (app_id, group_name) VALUES ($1, $2)")
            .bind(app_id)
            .bind(group)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(app_id, count = groups.len(), "application permissions replaced");
    Ok(())
}

/// Groups allowed to open an application, sorted.
pub async fn get_application_permissions(
    pool: &SqlitePool,
    app_id: &str,
) -> Result<Vec<String>, AuthError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT group_name FROM app_permissions WHERE app_id = $1 ORDER BY group_name",
    )
    .bind(app_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Whether an application carries the public marker.
pub async fn is_application_public(pool: &SqlitePool, app_id: &str) -> Result<bool, AuthError> {
    let public = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM app_permissions WHERE app_id = $1 AND group_name = $2)",
    )
    .bind(app_id)
    .bind(PUBLIC_GROUP)
    .fetch_one(pool)
    .await?;
    Ok(public)
}

/// Load every permission row into a map.
pub async fn all_permissions(pool: &SqlitePool) -> Result<PermissionMap, AuthError> {
    let rows =
        sqlx::query_as::<_, (String, String)>("SELECT app_id, group_name FROM app_permissions")
            .fetch_all(pool)
            .await?;
    let mut map = PermissionMap::new();
    for (app_id, group) in rows {
        map.entry(app_id).or_default().insert(group);
    }
    Ok(map)
}

/// Applications visible to a user. Unknown or inactive users see nothing.
pub async fn list_accessible_applications(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<Application>, AuthError> {
    let user = match get_user_by_id(pool, user_id).await? {
        Some(u) if u.is_active => u,
        _ => return Ok(Vec::new()),
    };
    let groups = get_user_groups(pool, user_id).await?;
    let apps = list_applications(pool).await?;
    let permissions = all_permissions(pool).await?;
    Ok(visible_applications(user.role, &groups, &apps, &permissions))
}

/// Whether a user may open a specific application.
pub async fn user_can_access(
    pool: &SqlitePool,
    user_id: &str,
    app_id: &str,
) -> Result<bool, AuthError> {
    let user = match get_user_by_id(pool, user_id).await? {
        Some(u) if u.is_active => u,
        _ => return Ok(false),
    };
    let app = match get_application(pool, app_id).await? {
        Some(a) => a,
        None => return Ok(false),
    };
    let groups = get_user_groups(pool, user_id).await?;
    let permissions = all_permissions(pool).await?;
    Ok(is_visible(user.role, &groups, &app, &permissions))
}
