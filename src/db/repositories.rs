//! Repository record queries.
//!
//! Scans persist repositories in two steps: an upsert of everything that
//! was enriched, then a delete of everything the listing no longer
//! mentions. The upsert always runs first so a failed delete never loses
//! fresh data.

use crate::models::{new_id, Repository, RepositorySnapshot};
use crate::{Error, Result};
use chrono::Utc;

use super::DbPool;

/// Result of an upsert batch.
#[derive(Debug, Clone, Default)]
pub struct UpsertSummary {
    /// Rows as stored after the batch, in input order.
    pub repositories: Vec<Repository>,
    /// Rows that did not exist before.
    pub added: usize,
    /// Rows that already existed and were refreshed.
    pub updated: usize,
}

/// Which repositories to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepositoryFilter {
    #[default]
    All,
    /// Only repositories a public viewer may see.
    PublicOnly,
}

/// Insert or update a batch of repositories for an account.
///
/// Runs in a single transaction, keyed on `(user_id, github_id)`.
/// An existing row keeps its id and `created_at`. An empty batch is a
/// no-op and does not touch the database.
pub async fn upsert_repositories(
    pool: &DbPool,
    user_id: &str,
    items: &[RepositorySnapshot],
) -> Result<UpsertSummary> {
    if items.is_empty() {
        return Ok(UpsertSummary::default());
    }

    let now = Utc::now();
    let mut summary = UpsertSummary::default();
    let mut tx = pool.begin().await?;

    for item in items {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM repositories WHERE user_id = ? AND github_id = ?")
                .bind(user_id)
                .bind(item.github_id)
                .fetch_optional(&mut *tx)
                .await?;

        let repo = sqlx::query_as::<_, Repository>(
            r#"
            INSERT INTO repositories (
                id, user_id, github_id, name, full_name, description, private,
                html_url, clone_url, last_commit_date, last_push_date, is_fork,
                is_archived, default_branch, language, stars_count, forks_count,
                open_issues_count, size_kb, created_at, updated_at, last_scanned_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, github_id) DO UPDATE SET
                name = excluded.name,
                full_name = excluded.full_name,
                description = excluded.description,
                private = excluded.private,
                html_url = excluded.html_url,
                clone_url = excluded.clone_url,
                last_commit_date = excluded.last_commit_date,
                last_push_date = excluded.last_push_date,
                is_fork = excluded.is_fork,
                is_archived = excluded.is_archived,
                default_branch = excluded.default_branch,
                language = excluded.language,
                stars_count = excluded.stars_count,
                forks_count = excluded.forks_count,
                open_issues_count = excluded.open_issues_count,
                size_kb = excluded.size_kb,
                updated_at = excluded.updated_at,
                last_scanned_at = excluded.last_scanned_at
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(user_id)
        .bind(item.github_id)
        .bind(&item.name)
        .bind(&item.full_name)
        .bind(&item.description)
        .bind(item.private)
        .bind(&item.html_url)
        .bind(&item.clone_url)
        .bind(item.last_commit_date)
        .bind(item.last_push_date)
        .bind(item.is_fork)
        .bind(item.is_archived)
        .bind(&item.default_branch)
        .bind(&item.language)
        .bind(item.stars_count)
        .bind(item.forks_count)
        .bind(item.open_issues_count)
        .bind(item.size_kb)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if existing.is_some() {
            summary.updated += 1;
        } else {
            summary.added += 1;
        }
        summary.repositories.push(repo);
    }

    tx.commit().await?;

    Ok(summary)
}

/// Delete every repository of an account whose GitHub id is not in `keep`.
///
/// An empty keep-set deletes all of the account's repositories.
/// Returns the number of rows removed.
pub async fn delete_stale_repositories(pool: &DbPool, user_id: &str, keep: &[i64]) -> Result<u64> {
    let result = if keep.is_empty() {
        sqlx::query("DELETE FROM repositories WHERE user_id = ?")
            .bind(user_id)
            .execute(pool)
            .await?
    } else {
        // Ids travel as one JSON array so the statement never hits the bind limit
        let keep_json = serde_json::to_string(keep)?;
        sqlx::query(
            r#"
            DELETE FROM repositories
            WHERE user_id = ?
              AND github_id NOT IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(user_id)
        .bind(keep_json)
        .execute(pool)
        .await?
    };

    Ok(result.rows_affected())
}

/// List an account's repositories, most recently committed first.
/// Repositories with no commit date sort last.
pub async fn list_repositories(
    pool: &DbPool,
    user_id: &str,
    filter: RepositoryFilter,
) -> Result<Vec<Repository>> {
    let query = match filter {
        RepositoryFilter::All => {
            r#"
            SELECT * FROM repositories
            WHERE user_id = ?
            ORDER BY last_commit_date IS NULL, last_commit_date DESC, full_name
            "#
        }
        RepositoryFilter::PublicOnly => {
            r#"
            SELECT * FROM repositories
            WHERE user_id = ? AND private = 0
            ORDER BY last_commit_date IS NULL, last_commit_date DESC, full_name
            "#
        }
    };

    sqlx::query_as::<_, Repository>(query)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Error::Database)
}

/// Get one repository by GitHub id.
pub async fn get_repository_by_github_id(
    pool: &DbPool,
    user_id: &str,
    github_id: i64,
) -> Result<Option<Repository>> {
    sqlx::query_as::<_, Repository>("SELECT * FROM repositories WHERE user_id = ? AND github_id = ?")
        .bind(user_id)
        .bind(github_id)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}

/// Count an account's repositories.
pub async fn count_repositories(pool: &DbPool, user_id: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM repositories WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
