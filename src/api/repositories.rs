//! Repository Routes
//!
//! Routes:
//! - GET /api/repositories?type=all|abandoned|active - Stored repositories with their classification

use axum::{
    extract::{Extension, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{self, RepositoryFilter};
use crate::middleware::SessionUser;
use crate::models::Repository;
use crate::services::is_abandoned_at;
use crate::{AppState, Result};

/// Build repository routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/repositories", get(list_repositories))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Which side of the abandonment split to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    #[default]
    All,
    Abandoned,
    Active,
}

#[derive(Debug, Deserialize)]
pub struct ListRepositoriesQuery {
    #[serde(rename = "type", default)]
    pub list_type: ListType,
}

/// A stored repository with its current classification.
#[derive(Debug, Serialize)]
pub struct ClassifiedRepository {
    #[serde(flatten)]
    pub repository: Repository,
    pub abandoned: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub abandonment_threshold_months: i64,
    pub dashboard_public: bool,
    pub dashboard_slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RepositoryStats {
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ListRepositoriesResponse {
    pub repositories: Vec<ClassifiedRepository>,
    pub config: ConfigSummary,
    pub stats: RepositoryStats,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the signed-in account's repositories.
///
/// GET /api/repositories
///
/// Ordered by last commit, most recent first, repositories without commit
/// data last. Classification uses the account's current threshold.
#[axum::debug_handler]
async fn list_repositories(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Query(query): Query<ListRepositoriesQuery>,
) -> Result<Json<ListRepositoriesResponse>> {
    let config = db::get_or_create_config(&state.db, session.user_id()).await?;
    let threshold = config.threshold_months();
    let now = Utc::now();

    let repositories: Vec<ClassifiedRepository> =
        db::list_repositories(&state.db, session.user_id(), RepositoryFilter::All)
            .await?
            .into_iter()
            .map(|repository| ClassifiedRepository {
                abandoned: is_abandoned_at(repository.activity(), threshold, now),
                repository,
            })
            .filter(|r| match query.list_type {
                ListType::All => true,
                ListType::Abandoned => r.abandoned,
                ListType::Active => !r.abandoned,
            })
            .collect();

    Ok(Json(ListRepositoriesResponse {
        stats: RepositoryStats {
            total: repositories.len(),
        },
        repositories,
        config: ConfigSummary {
            abandonment_threshold_months: config.abandonment_threshold_months,
            dashboard_public: config.dashboard_public,
            dashboard_slug: config.dashboard_slug,
        },
    }))
}
