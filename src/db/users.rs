//! User database queries.

use crate::models::{new_id, GitHubCredentials, User};
use crate::{Error, Result};
use chrono::Utc;

use super::DbPool;

/// Insert a user or refresh the stored credentials of an existing one.
///
/// Accounts are keyed by GitHub username. The internal id and creation
/// time survive a re-login.
pub async fn upsert_user(pool: &DbPool, creds: &GitHubCredentials) -> Result<User> {
    let now = Utc::now();

    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (
            id, username, github_id, access_token, refresh_token,
            access_token_expires_at, refresh_token_expires_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(username) DO UPDATE SET
            github_id = COALESCE(excluded.github_id, users.github_id),
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            access_token_expires_at = excluded.access_token_expires_at,
            refresh_token_expires_at = excluded.refresh_token_expires_at,
            updated_at = excluded.updated_at
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(&creds.username)
    .bind(creds.github_id)
    .bind(&creds.access_token)
    .bind(&creds.refresh_token)
    .bind(creds.access_token_expires_at)
    .bind(creds.refresh_token_expires_at)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Get a user by ID.
pub async fn get_user(pool: &DbPool, id: &str) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))
}

/// Get a user by GitHub username.
pub async fn get_user_by_username(pool: &DbPool, username: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}
