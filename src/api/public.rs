//! Public Dashboard Routes
//!
//! Routes:
//! - GET /api/public/:slug - Abandoned public repositories of an account that opted in

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::db::{self, RepositoryFilter};
use crate::models::Repository;
use crate::services::is_abandoned_at;
use crate::{AppState, Error, Result};

/// Build public dashboard routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/public/:slug", get(public_dashboard))
}

// ============================================================================
// Response Types
// ============================================================================

/// Repository fields safe to show to anonymous visitors.
#[derive(Debug, Serialize)]
pub struct PublicRepository {
    pub github_id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub last_commit_date: Option<DateTime<Utc>>,
    pub last_push_date: Option<DateTime<Utc>>,
    pub is_fork: bool,
    pub is_archived: bool,
    pub language: Option<String>,
    pub stars_count: i64,
    pub forks_count: i64,
    pub open_issues_count: i64,
    pub last_scanned_at: DateTime<Utc>,
}

impl From<Repository> for PublicRepository {
    fn from(r: Repository) -> Self {
        Self {
            github_id: r.github_id,
            name: r.name,
            full_name: r.full_name,
            description: r.description,
            html_url: r.html_url,
            last_commit_date: r.last_commit_date,
            last_push_date: r.last_push_date,
            is_fork: r.is_fork,
            is_archived: r.is_archived,
            language: r.language,
            stars_count: r.stars_count,
            forks_count: r.forks_count,
            open_issues_count: r.open_issues_count,
            last_scanned_at: r.last_scanned_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicConfig {
    pub abandonment_threshold_months: i64,
    pub dashboard_slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct PublicStats {
    pub total: usize,
    /// Most recent scan time across the listed repositories
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PublicDashboardResponse {
    pub repositories: Vec<PublicRepository>,
    pub config: PublicConfig,
    pub user: PublicUser,
    pub stats: PublicStats,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/public/:slug
///
/// 404 when the slug is unknown or the dashboard is not public. Private
/// repositories are excluded by the query and dropped again here.
#[axum::debug_handler]
async fn public_dashboard(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PublicDashboardResponse>> {
    let owner = db::get_public_dashboard_owner(&state.db, &slug)
        .await?
        .ok_or_else(|| Error::NotFound("Dashboard not found or not public".to_string()))?;

    let threshold = owner.config.threshold_months();
    let now = Utc::now();

    let repositories: Vec<Repository> =
        db::list_repositories(&state.db, &owner.config.user_id, RepositoryFilter::PublicOnly)
            .await?
            .into_iter()
            .filter(|r| !r.private)
            .filter(|r| is_abandoned_at(r.activity(), threshold, now))
            .collect();

    let last_updated = repositories.iter().map(|r| r.last_scanned_at).max();

    debug!(slug = %slug, count = repositories.len(), "Serving public dashboard");

    Ok(Json(PublicDashboardResponse {
        stats: PublicStats {
            total: repositories.len(),
            last_updated,
        },
        repositories: repositories.into_iter().map(PublicRepository::from).collect(),
        config: PublicConfig {
            abandonment_threshold_months: owner.config.abandonment_threshold_months,
            dashboard_slug: owner.config.dashboard_slug,
        },
        user: PublicUser {
            username: owner.username,
        },
    }))
}
