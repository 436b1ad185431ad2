//! Login session and OAuth state queries.
//!
//! Only token hashes are stored. Callers hash the raw cookie value
//! before looking anything up.

use crate::models::{new_id, OAuthState, Session};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

use super::DbPool;

// ============================================================================
// Sessions
// ============================================================================

/// Create a session for a user.
pub async fn create_session(
    pool: &DbPool,
    user_id: &str,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<Session> {
    sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(token_hash)
    .bind(Utc::now())
    .bind(expires_at)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Look up a session by token hash.
pub async fn get_session_by_hash(pool: &DbPool, token_hash: &str) -> Result<Option<Session>> {
    sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}

/// Push a session's expiry forward.
pub async fn extend_session(pool: &DbPool, id: &str, expires_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
        .bind(expires_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a session by ID.
pub async fn delete_session(pool: &DbPool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a session by token hash. Returns whether a session existed.
pub async fn delete_session_by_hash(pool: &DbPool, token_hash: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove expired sessions and OAuth states.
pub async fn cleanup_expired(pool: &DbPool) -> Result<u64> {
    let now = Utc::now();

    let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;
    let states = sqlx::query("DELETE FROM oauth_states WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(sessions.rows_affected() + states.rows_affected())
}

// ============================================================================
// OAuth states
// ============================================================================

/// Store the CSRF state of a pending authorisation.
pub async fn create_oauth_state(
    pool: &DbPool,
    state: &str,
    pkce_verifier: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<OAuthState> {
    sqlx::query_as::<_, OAuthState>(
        r#"
        INSERT INTO oauth_states (id, state, pkce_verifier, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(state)
    .bind(pkce_verifier)
    .bind(Utc::now())
    .bind(expires_at)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Fetch and delete an OAuth state. A state can be consumed once.
pub async fn take_oauth_state(pool: &DbPool, state: &str) -> Result<Option<OAuthState>> {
    sqlx::query_as::<_, OAuthState>("DELETE FROM oauth_states WHERE state = ? RETURNING *")
        .bind(state)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}
