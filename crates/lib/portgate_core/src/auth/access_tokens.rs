//! Access token broker.
//!
//! Short-lived tokens that let one user open one application. Each token
//! is bound to the portal session that minted it: it redeems only while
//! that session is still active, and only once. Redemption deletes the row
//! inside the same transaction that checks it, so concurrent attempts on
//! the same token see exactly one success.

use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, info};

use super::sessions::find_session_user;
use super::{AuthError, generate_token, hash_token};
use crate::clock::{now_millis, ttl_millis};
use crate::models::auth::Redemption;

/// Default access token lifetime: 1 hour.
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Upper bound on access token lifetime.
pub const MAX_ACCESS_TOKEN_TTL: Duration = DEFAULT_ACCESS_TOKEN_TTL;

/// Mint a token granting `user_id` access to `app_id`, bound to
/// `owner_session`.
///
/// The owning session must be valid and belong to `user_id`; otherwise
/// [`AuthError::OwningSessionInvalid`]. Expired tokens are purged first.
pub async fn issue_token(
    pool: &SqlitePool,
    user_id: &str,
    app_id: &str,
    owner_session: &str,
    ttl: Duration,
) -> Result<String, AuthError> {
    if ttl.is_zero() || ttl > MAX_ACCESS_TOKEN_TTL {
        return Err(AuthError::ValidationError(format!(
            "Access token lifetime must be between 1ms and {}s",
            MAX_ACCESS_TOKEN_TTL.as_secs()
        )));
    }

    let now = now_millis();
    let owner_hash = hash_token(owner_session);
    let mut tx = pool.begin().await?;

    let purged = sqlx::query("DELETE FROM access_tokens WHERE expires_at <= $1")
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if purged > 0 {
        debug!(purged, "expired access tokens removed");
    }

    match find_session_user(&mut tx, &owner_hash, now).await? {
        Some(owner) if owner.id == user_id => {}
        _ => {
            debug!(user_id, app_id, "issue rejected: owning session invalid");
            return Err(AuthError::OwningSessionInvalid);
        }
    }

    let token = generate_token();
    sqlx::query(
        "INSERT INTO access_tokens \
           (token_hash, user_id, app_id, owner_session_hash, created_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .bind(app_id)
    .bind(&owner_hash)
    .bind(now)
    .bind(now.saturating_add(ttl_millis(ttl)))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(user_id, app_id, "access token issued");
    Ok(token)
}

/// Redeem a token for `app_id`, consuming it.
///
/// Fails with [`AuthError::TokenInvalid`] for unknown, expired, consumed or
/// wrong-app tokens and [`AuthError::OwningSessionInvalid`] when the
/// issuing session is gone.
pub async fn redeem_token(
    pool: &SqlitePool,
    token: &str,
    app_id: &str,
) -> Result<Redemption, AuthError> {
    redeem(pool, token, app_id, None).await
}

/// Redeem a token that must have been minted by `owner_session`.
///
/// A token presented under any other session, even a valid one for the
/// same user, is rejected with [`AuthError::TokenInvalid`].
pub async fn redeem_token_bound(
    pool: &SqlitePool,
    token: &str,
    app_id: &str,
    owner_session: &str,
) -> Result<Redemption, AuthError> {
    redeem(pool, token, app_id, Some(owner_session)).await
}

async fn redeem(
    pool: &SqlitePool,
    token: &str,
    app_id: &str,
    expected_owner: Option<&str>,
) -> Result<Redemption, AuthError> {
    let now = now_millis();
    let mut tx = pool.begin().await?;

    // The delete claims the row; every rejection below rolls it back, so
    // only a fully successful redemption consumes the token.
    let row = sqlx::query_as::<_, (String, String, String, i64)>(
        "DELETE FROM access_tokens WHERE token_hash = $1 \
         RETURNING user_id, app_id, owner_session_hash, expires_at",
    )
    .bind(hash_token(token))
    .fetch_optional(&mut *tx)
    .await?;

    let (user_id, token_app_id, owner_hash, expires_at) = match row {
        Some(r) => r,
        None => {
            debug!(app_id, "redeem rejected: unknown or consumed token");
            return Err(AuthError::TokenInvalid);
        }
    };

    if expires_at <= now {
        // Expired rows are garbage either way; keep the delete.
        tx.commit().await?;
        debug!(user_id, app_id, "redeem rejected: token expired");
        return Err(AuthError::TokenInvalid);
    }

    if token_app_id != app_id {
        debug!(user_id, app_id, "redeem rejected: application mismatch");
        return Err(AuthError::TokenInvalid);
    }

    if let Some(expected) = expected_owner
        && hash_token(expected) != owner_hash
    {
        debug!(user_id, app_id, "redeem rejected: presented under another session");
        return Err(AuthError::TokenInvalid);
    }

    match find_session_user(&mut tx, &owner_hash, now).await? {
        Some(owner) if owner.id == user_id => {}
        _ => {
            debug!(user_id, app_id, "redeem rejected: owning session invalid");
            return Err(AuthError::OwningSessionInvalid);
        }
    }

    tx.commit().await?;
    info!(user_id, app_id, "access token redeemed");
    Ok(Redemption {
        user_id,
        app_id: token_app_id,
    })
}

/// Delete expired tokens. Returns the number removed.
pub async fn purge_expired_tokens(pool: &SqlitePool) -> Result<u64, AuthError> {
    let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at <= $1")
        .bind(now_millis())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
