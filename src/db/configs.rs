//! Account configuration queries.
//!
//! Configuration rows are created lazily with defaults the first time an
//! account's settings are read.

use std::sync::OnceLock;

use regex::Regex;
use sqlx::FromRow;

use crate::models::{UpdateUserConfig, UserConfig, DEFAULT_THRESHOLD_MONTHS};
use crate::{Error, Result};
use chrono::Utc;

use super::DbPool;

/// A public dashboard's configuration together with its owner's username.
#[derive(Debug, Clone, FromRow)]
pub struct PublicDashboardOwner {
    #[sqlx(flatten)]
    pub config: UserConfig,
    pub username: String,
}

/// Get an account's configuration, creating the default row if missing.
pub async fn get_or_create_config(pool: &DbPool, user_id: &str) -> Result<UserConfig> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO user_configs (
            user_id, abandonment_threshold_months, dashboard_public,
            dashboard_slug, scan_private_repos, created_at, updated_at
        )
        VALUES (?, ?, 0, NULL, 0, ?, ?)
        ON CONFLICT(user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(DEFAULT_THRESHOLD_MONTHS as i64)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, UserConfig>("SELECT * FROM user_configs WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Config not found for user: {}", user_id)))
}

/// Apply a partial update. Unset fields keep their stored value.
pub async fn update_config(
    pool: &DbPool,
    user_id: &str,
    input: UpdateUserConfig,
) -> Result<UserConfig> {
    get_or_create_config(pool, user_id).await?;

    sqlx::query_as::<_, UserConfig>(
        r#"
        UPDATE user_configs SET
            abandonment_threshold_months = COALESCE(?, abandonment_threshold_months),
            scan_private_repos = COALESCE(?, scan_private_repos),
            updated_at = ?
        WHERE user_id = ?
        RETURNING *
        "#,
    )
    .bind(input.abandonment_threshold_months.map(i64::from))
    .bind(input.scan_private_repos)
    .bind(Utc::now())
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Config not found for user: {}", user_id)))
}

fn slug_invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").unwrap())
}

/// Base slug for a username: `{username}-repos`, lower-cased, with every
/// character outside `[a-z0-9-]` replaced by `-`.
pub fn base_dashboard_slug(username: &str) -> String {
    let raw = format!("{}-repos", username).to_lowercase();
    slug_invalid_chars().replace_all(&raw, "-").into_owned()
}

/// Find a free dashboard slug for a username, appending `-1`, `-2`, ...
/// on collision.
pub async fn generate_dashboard_slug(pool: &DbPool, username: &str) -> Result<String> {
    let base = base_dashboard_slug(username);
    let mut slug = base.clone();
    let mut counter = 1;

    loop {
        let taken: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM user_configs WHERE dashboard_slug = ?")
                .bind(&slug)
                .fetch_optional(pool)
                .await?;

        if taken.is_none() {
            return Ok(slug);
        }

        slug = format!("{}-{}", base, counter);
        counter += 1;
    }
}

/// Make an account's dashboard public. An account that already has a slug
/// keeps it.
pub async fn enable_public_dashboard(
    pool: &DbPool,
    user_id: &str,
    username: &str,
) -> Result<UserConfig> {
    let current = get_or_create_config(pool, user_id).await?;

    let slug = match current.dashboard_slug {
        Some(slug) => slug,
        None => generate_dashboard_slug(pool, username).await?,
    };

    sqlx::query_as::<_, UserConfig>(
        r#"
        UPDATE user_configs SET
            dashboard_public = 1,
            dashboard_slug = ?,
            updated_at = ?
        WHERE user_id = ?
        RETURNING *
        "#,
    )
    .bind(&slug)
    .bind(Utc::now())
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            Error::Conflict(format!("Dashboard slug already taken: {}", slug))
        }
        _ => Error::Database(e),
    })
}

/// Make an account's dashboard private and release its slug.
pub async fn disable_public_dashboard(pool: &DbPool, user_id: &str) -> Result<UserConfig> {
    get_or_create_config(pool, user_id).await?;

    sqlx::query_as::<_, UserConfig>(
        r#"
        UPDATE user_configs SET
            dashboard_public = 0,
            dashboard_slug = NULL,
            updated_at = ?
        WHERE user_id = ?
        RETURNING *
        "#,
    )
    .bind(Utc::now())
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Resolve a public dashboard slug. Returns `None` when the slug is unknown
/// or the dashboard is not public.
pub async fn get_public_dashboard_owner(
    pool: &DbPool,
    slug: &str,
) -> Result<Option<PublicDashboardOwner>> {
    sqlx::query_as::<_, PublicDashboardOwner>(
        r#"
        SELECT c.*, u.username
        FROM user_configs c
        JOIN users u ON u.id = c.user_id
        WHERE c.dashboard_slug = ? AND c.dashboard_public = 1
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)
}
