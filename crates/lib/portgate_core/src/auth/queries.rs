//! Credential store: users and group memberships.
//!
//! Every mutation runs in a single transaction.

use std::collections::BTreeSet;

use sqlx::SqlitePool;
use tracing::info;

use super::AuthError;
use super::password::{hash_password, verify_password as verify_hash};
use crate::clock::{from_millis, now_millis};
use crate::models::auth::{NewUser, Role, User, UserUpdate};
use crate::uuid::new_id;

/// Columns selected for a [`User`], in [`UserRow`] order.
const USER_COLUMNS: &str =
    "id, username, full_name, email, role, is_active, created_at, last_login";

type UserRow = (String, String, String, String, String, bool, i64, Option<i64>);

fn user_from_row(row: UserRow) -> Result<User, AuthError> {
    let (id, username, full_name, email, role, is_active, created_at, last_login) = row;
    Ok(User {
        id,
        username,
        full_name,
        email,
        role: role.parse::<Role>().map_err(AuthError::Internal)?,
        is_active,
        created_at: from_millis(created_at),
        last_login: last_login.map(from_millis),
    })
}

/// Trim, drop empties and de-duplicate group names.
pub(crate) fn normalize_groups(groups: &[String]) -> BTreeSet<String> {
    groups
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Create a new user. Usernames are unique.
pub async fn create_user(pool: &SqlitePool, new_user: &NewUser) -> Result<User, AuthError> {
    let username = new_user.username.trim();
    if username.is_empty() {
        return Err(AuthError::ValidationError("Username is required".into()));
    }
    if new_user.password.is_empty() {
        return Err(AuthError::ValidationError("Password is required".into()));
    }
    if username_exists(pool, username).await? {
        return Err(AuthError::ValidationError("Username already exists".into()));
    }

    let password_hash = hash_password(&new_user.password)?;
    let id = new_id();
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, full_name, email, role, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&id)
    .bind(username)
    .bind(&password_hash)
    .bind(&new_user.full_name)
    .bind(&new_user.email)
    .bind(new_user.role.as_str())
    .bind(now_millis())
    .execute(pool)
    .await
    .map_err(username_taken)?;

    info!(user_id = %id, username, role = %new_user.role, "user created");
    get_user_by_id(pool, &id)
        .await?
        .ok_or_else(|| AuthError::Internal("user vanished after insert".into()))
}

/// Check a username/password pair.
///
/// Unknown, inactive and wrong-password cases all return
/// [`AuthError::CredentialError`]. On success `last_login` is updated.
pub async fn verify_password(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT id, password_hash FROM users WHERE username = $1 AND is_active = 1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    let (user_id, pw_hash) = match row {
        None => return Err(AuthError::CredentialError),
        Some(r) => r,
    };

    if !verify_hash(password, &pw_hash)? {
        return Err(AuthError::CredentialError);
    }

    sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
        .bind(now_millis())
        .bind(&user_id)
        .execute(pool)
        .await?;

    get_user_by_id(pool, &user_id)
        .await?
        .ok_or(AuthError::CredentialError)
}

/// Fetch a user by ID.
pub async fn get_user_by_id(pool: &SqlitePool, user_id: &str) -> Result<Option<User>, AuthError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    row.map(user_from_row).transpose()
}

/// Fetch a user by username.
pub async fn get_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, AuthError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;
    row.map(user_from_row).transpose()
}

/// List all users, newest first.
pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>, AuthError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC");
    let rows = sqlx::query_as::<_, UserRow>(&sql).fetch_all(pool).await?;
    rows.into_iter().map(user_from_row).collect()
}

/// Check whether a username is already registered.
pub async fn username_exists(pool: &SqlitePool, username: &str) -> Result<bool, AuthError> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// A UNIQUE violation on `users.username` reads as a validation error;
/// anything else is a storage failure.
fn username_taken(e: sqlx::Error) -> AuthError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AuthError::ValidationError("Username already exists".into())
        }
        other => AuthError::from(other),
    }
}

/// Apply a partial update to a user.
pub async fn update_user(
    pool: &SqlitePool,
    user_id: &str,
    update: &UserUpdate,
) -> Result<User, AuthError> {
    if update.is_empty() {
        return Err(AuthError::ValidationError("Nothing to update".into()));
    }

    let password_hash = match &update.password {
        Some(p) if p.is_empty() => {
            return Err(AuthError::ValidationError("Password must not be empty".into()));
        }
        Some(p) => Some(hash_password(p)?),
        None => None,
    };

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE users SET \
           username = COALESCE($1, username), \
           password_hash = COALESCE($2, password_hash), \
           full_name = COALESCE($3, full_name), \
           email = COALESCE($4, email), \
           role = COALESCE($5, role) \
         WHERE id = $6",
    )
    .bind(update.username.as_deref().map(str::trim))
    .bind(password_hash.as_deref())
    .bind(update.full_name.as_deref())
    .bind(update.email.as_deref())
    .bind(update.role.map(|r| r.as_str()))
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(username_taken)?;

    if result.rows_affected() == 0 {
        return Err(AuthError::ValidationError("Unknown user".into()));
    }
    tx.commit().await?;

    get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AuthError::ValidationError("Unknown user".into()))
}

/// Enable or disable a user. Disabled users cannot log in and their
/// sessions stop validating.
pub async fn set_user_active(
    pool: &SqlitePool,
    user_id: &str,
    active: bool,
) -> Result<bool, AuthError> {
    let result = sqlx::query("UPDATE users SET is_active = $1 WHERE id = $2")
        .bind(active)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a user together with its group memberships.
///
/// Sessions and access tokens go with it through `ON DELETE CASCADE`.
pub async fn delete_user(pool: &SqlitePool, user_id: &str) -> Result<bool, AuthError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_groups WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        info!(user_id, "user deleted");
    }
    Ok(deleted)
}

/// Create the named admin account if it does not exist yet.
///
/// Returns `true` when a new account was created.
pub async fn ensure_admin(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<bool, AuthError> {
    if username_exists(pool, username).await? {
        return Ok(false);
    }
    create_user(
        pool,
        &NewUser {
            username: username.to_string(),
            password: password.to_string(),
            full_name: "System Administrator".to_string(),
            email: String::new(),
            role: Role::Admin,
        },
    )
    .await?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Group membership
// ---------------------------------------------------------------------------

/// Fetch the groups a user belongs to, sorted.
pub async fn get_user_groups(pool: &SqlitePool, user_id: &str) -> Result<Vec<String>, AuthError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT group_name FROM user_groups WHERE user_id = $1 ORDER BY group_name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replace a user's group memberships.
pub async fn set_user_groups(
    pool: &SqlitePool,
    user_id: &str,
    groups: &[String],
) -> Result<(), AuthError> {
    let groups = normalize_groups(groups);

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_groups WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
    if !exists {
        return Err(AuthError::ValidationError("Unknown user".into()));
    }

    for group in &groups {
        sqlx::query("INSERT INTO user_groups (user_id, group_name) VALUES ($1, $2)")
            .bind(user_id)
            .bind(group)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(user_id, count = groups.len(), "user groups replaced");
    Ok(())
}

/// Add a user to a group. Adding an existing membership is a no-op.
pub async fn add_user_to_group(
    pool: &SqlitePool,
    user_id: &str,
    group: &str,
) -> Result<(), AuthError> {
    let group = group.trim();
    if group.is_empty() {
        return Err(AuthError::ValidationError("Group name is required".into()));
    }
    sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_name) VALUES ($1, $2)")
        .bind(user_id)
        .bind(group)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove a user from a group.
pub async fn remove_user_from_group(
    pool: &SqlitePool,
    user_id: &str,
    group: &str,
) -> Result<bool, AuthError> {
    let result = sqlx::query("DELETE FROM user_groups WHERE user_id = $1 AND group_name = $2")
        .bind(user_id)
        .bind(group)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// List every group name in use by a membership, sorted.
pub async fn list_groups(pool: &SqlitePool) -> Result<Vec<String>, AuthError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT group_name FROM user_groups ORDER BY group_name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
