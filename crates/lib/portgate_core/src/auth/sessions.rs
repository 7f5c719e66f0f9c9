//! Portal sessions.
//!
//! Long-lived "this browser is logged in as user U" sessions. A user holds
//! at most one active session: creating or refreshing one retires every
//! other. Expiry is absolute and checked on each validation.

use std::time::Duration;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{AuthError, generate_token, hash_token};
use crate::clock::{from_millis, now_millis, ttl_millis};
use crate::models::auth::{Role, SessionUser};

/// Default portal session lifetime: 24 hours.
pub const DEFAULT_PORTAL_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

type SessionRow = (String, String, String, String, String, i64);

/// Look up the user behind an active, unexpired session digest.
pub(crate) async fn find_session_user(
    conn: &mut SqliteConnection,
    token_hash: &str,
    now: i64,
) -> Result<Option<SessionUser>, AuthError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT u.id, u.username, u.full_name, u.email, u.role, s.expires_at \
         FROM portal_sessions s \
         JOIN users u ON u.id = s.user_id \
         WHERE s.token_hash = $1 \
           AND s.is_active = 1 \
           AND s.expires_at > $2 \
           AND u.is_active = 1",
    )
    .bind(token_hash)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|(id, username, full_name, email, role, expires_at)| {
        Ok(SessionUser {
            id,
            username,
            full_name,
            email,
            role: role.parse::<Role>().map_err(AuthError::Internal)?,
            expires_at: from_millis(expires_at),
        })
    })
    .transpose()
}

/// Retire the user's sessions and insert a fresh one. Runs on the caller's
/// transaction so the swap is atomic per user.
async fn replace_sessions(
    conn: &mut SqliteConnection,
    user_id: &str,
    ttl: Duration,
    now: i64,
) -> Result<String, AuthError> {
    sqlx::query("UPDATE portal_sessions SET is_active = 0 WHERE user_id = $1 AND is_active = 1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let token = generate_token();
    sqlx::query(
        "INSERT INTO portal_sessions (token_hash, user_id, created_at, expires_at, is_active) \
         VALUES ($1, $2, $3, $4, 1)",
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .bind(now)
    .bind(now.saturating_add(ttl_millis(ttl)))
    .execute(&mut *conn)
    .await?;

    Ok(token)
}

/// Create a portal session for `user_id`, retiring all of the user's other
/// sessions. Returns the opaque token for the browser cookie.
pub async fn create_session(
    pool: &SqlitePool,
    user_id: &str,
    ttl: Duration,
) -> Result<String, AuthError> {
    let now = now_millis();
    let mut tx = pool.begin().await?;

    // Opening with a write takes SQLite's write lock for the whole swap.
    sqlx::query("DELETE FROM portal_sessions WHERE expires_at <= $1")
        .bind(now)
        .execute(&mut *tx)
        .await?;

    let token = replace_sessions(&mut tx, user_id, ttl, now).await?;
    tx.commit().await?;

    info!(user_id, "portal session created");
    Ok(token)
}

/// Validate a portal session token.
///
/// Read-only: a successful validation never extends the expiry.
pub async fn validate_session(
    pool: &SqlitePool,
    token: &str,
) -> Result<Option<SessionUser>, AuthError> {
    let mut conn = pool.acquire().await?;
    find_session_user(&mut conn, &hash_token(token), now_millis()).await
}

/// Reissue a session: the old token stops validating and a new one for the
/// same user is returned.
pub async fn refresh_session(
    pool: &SqlitePool,
    old_token: &str,
    ttl: Duration,
) -> Result<String, AuthError> {
    let now = now_millis();
    let old_hash = hash_token(old_token);
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM portal_sessions WHERE expires_at <= $1")
        .bind(now)
        .execute(&mut *tx)
        .await?;

    let user = match find_session_user(&mut tx, &old_hash, now).await? {
        Some(user) => user,
        None => {
            debug!("refresh rejected: session not valid");
            return Err(AuthError::SessionInvalid);
        }
    };

    let token = replace_sessions(&mut tx, &user.id, ttl, now).await?;
    tx.commit().await?;

    debug!(user_id = %user.id, "portal session refreshed");
    Ok(token)
}

/// Mark a session inactive (logout). Unknown tokens are ignored.
pub async fn invalidate_session(pool: &SqlitePool, token: &str) -> Result<(), AuthError> {
    let result = sqlx::query("UPDATE portal_sessions SET is_active = 0 WHERE token_hash = $1")
        .bind(hash_token(token))
        .execute(pool)
        .await?;
    if result.rows_affected() > 0 {
        info!("portal session invalidated");
    }
    Ok(())
}

/// Invalidate every session of a user.
pub async fn invalidate_user_sessions(pool: &SqlitePool, user_id: &str) -> Result<u64, AuthError> {
    let result =
        sqlx::query("UPDATE portal_sessions SET is_active = 0 WHERE user_id = $1 AND is_active = 1")
            .bind(user_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}
