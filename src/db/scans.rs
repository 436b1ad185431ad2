//! Scan ledger queries.
//!
//! A scan row is created `running` and moves exactly once to `completed`
//! or `failed`. Transitions are conditional on the row still running, so
//! a second transition is reported instead of silently overwriting.

use crate::models::{new_id, Scan, ScanCounts, ScanErrorDetail, ScanStatus};
use crate::{Error, Result};
use chrono::Utc;

use super::DbPool;

/// Create a new running scan for an account.
pub async fn start_scan(pool: &DbPool, user_id: &str) -> Result<Scan> {
    sqlx::query_as::<_, Scan>(
        r#"
        INSERT INTO scans (id, user_id, started_at, status)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(Utc::now())
    .bind(ScanStatus::Running.as_str())
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Get a scan by ID.
pub async fn get_scan(pool: &DbPool, id: &str) -> Result<Scan> {
    sqlx::query_as::<_, Scan>("SELECT * FROM scans WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Scan not found: {}", id)))
}

/// Get a scan only if it belongs to the given account.
pub async fn get_scan_for_user(pool: &DbPool, id: &str, user_id: &str) -> Result<Scan> {
    sqlx::query_as::<_, Scan>("SELECT * FROM scans WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Scan not found: {}", id)))
}

/// The account's currently running scan, if any.
pub async fn get_running_scan(pool: &DbPool, user_id: &str) -> Result<Option<Scan>> {
    sqlx::query_as::<_, Scan>(
        r#"
        SELECT * FROM scans
        WHERE user_id = ? AND status = 'running'
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)
}

/// Most recent scans for an account, newest first.
pub async fn list_scans(pool: &DbPool, user_id: &str, limit: i64) -> Result<Vec<Scan>> {
    sqlx::query_as::<_, Scan>(
        r#"
        SELECT * FROM scans
        WHERE user_id = ?
        ORDER BY started_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// The account's latest completed scan.
pub async fn get_last_completed_scan(pool: &DbPool, user_id: &str) -> Result<Option<Scan>> {
    sqlx::query_as::<_, Scan>(
        r#"
        SELECT * FROM scans
        WHERE user_id = ? AND status = 'completed'
        ORDER BY completed_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)
}

/// Mark a running scan completed and record its counts.
pub async fn complete_scan(pool: &DbPool, id: &str, counts: ScanCounts) -> Result<Scan> {
    let scan = sqlx::query_as::<_, Scan>(
        r#"
        UPDATE scans SET
            status = 'completed',
            completed_at = ?,
            repos_scanned = ?,
            repos_added = ?,
            repos_updated = ?,
            repos_deleted = ?,
            errors_count = ?
        WHERE id = ? AND status = 'running'
        RETURNING *
        "#,
    )
    .bind(Utc::now())
    .bind(counts.scanned)
    .bind(counts.added)
    .bind(counts.updated)
    .bind(counts.deleted)
    .bind(counts.errors)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match scan {
        Some(scan) => Ok(scan),
        None => Err(transition_error(pool, id).await),
    }
}

/// Mark a running scan failed with a structured error payload.
///
/// Counts reached before the failure are recorded when given, otherwise
/// the stored counts are left as they were.
pub async fn fail_scan(
    pool: &DbPool,
    id: &str,
    detail: &ScanErrorDetail,
    partial: Option<ScanCounts>,
) -> Result<Scan> {
    let detail_json = serde_json::to_string(detail)?;

    let scan = sqlx::query_as::<_, Scan>(
        r#"
        UPDATE scans SET
            status = 'failed',
            completed_at = ?,
            error_details = ?,
            errors_count = COALESCE(?, errors_count) + 1,
            repos_scanned = COALESCE(?, repos_scanned),
            repos_added = COALESCE(?, repos_added),
            repos_updated = COALESCE(?, repos_updated),
            repos_deleted = COALESCE(?, repos_deleted)
        WHERE id = ? AND status = 'running'
        RETURNING *
        "#,
    )
    .bind(detail.timestamp)
    .bind(detail_json)
    .bind(partial.map(|c| c.errors))
    .bind(partial.map(|c| c.scanned))
    .bind(partial.map(|c| c.added))
    .bind(partial.map(|c| c.updated))
    .bind(partial.map(|c| c.deleted))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match scan {
        Some(scan) => Ok(scan),
        None => Err(transition_error(pool, id).await),
    }
}

/// Fail every scan still marked running.
///
/// Run at startup, before any scan task exists, so every running row was
/// left behind by a previous process.
pub async fn fail_interrupted_scans(pool: &DbPool, detail: &ScanErrorDetail) -> Result<u64> {
    let detail_json = serde_json::to_string(detail)?;

    let result = sqlx::query(
        r#"
        UPDATE scans SET
            status = 'failed',
            completed_at = ?,
            error_details = ?,
            errors_count = errors_count + 1
        WHERE status = 'running'
        "#,
    )
    .bind(detail.timestamp)
    .bind(detail_json)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Explain why a transition matched no running row.
async fn transition_error(pool: &DbPool, id: &str) -> Error {
    match get_scan(pool, id).await {
        Ok(scan) => Error::Conflict(format!("Scan {} is already {}", id, scan.status)),
        Err(e) => e,
    }
}
