//! Account Configuration Routes
//!
//! Routes:
//! - GET /api/config - Current configuration, created with defaults on first read
//! - POST /api/config - Update threshold, private scanning and dashboard visibility

use axum::{
    extract::{Extension, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db;
use crate::middleware::SessionUser;
use crate::models::{validate_threshold, UpdateUserConfig, UserConfig};
use crate::{AppState, Result};

/// Build configuration routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/config", get(get_config).post(update_config))
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub abandonment_threshold_months: Option<i64>,
    pub dashboard_public: Option<bool>,
    pub scan_private_repos: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub config: UserConfig,
}

/// GET /api/config
#[axum::debug_handler]
async fn get_config(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
) -> Result<Json<UserConfig>> {
    let config = db::get_or_create_config(&state.db, session.user_id()).await?;
    Ok(Json(config))
}

/// POST /api/config
///
/// The threshold is range-checked before anything is written.
#[axum::debug_handler]
async fn update_config(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Json(request): Json<UpdateConfigRequest>,
) -> Result<Json<ConfigResponse>> {
    let threshold = request
        .abandonment_threshold_months
        .map(validate_threshold)
        .transpose()?;

    let mut config = db::update_config(
        &state.db,
        session.user_id(),
        UpdateUserConfig {
            abandonment_threshold_months: threshold,
            scan_private_repos: request.scan_private_repos,
        },
    )
    .await?;

    match request.dashboard_public {
        Some(true) if !config.dashboard_public => {
            config =
                db::enable_public_dashboard(&state.db, session.user_id(), session.username())
                    .await?;
            info!(
                user_id = %session.user_id(),
                slug = config.dashboard_slug.as_deref().unwrap_or_default(),
                "Public dashboard enabled"
            );
        }
        Some(false) if config.dashboard_public => {
            config = db::disable_public_dashboard(&state.db, session.user_id()).await?;
            info!(user_id = %session.user_id(), "Public dashboard disabled");
        }
        _ => {}
    }

    Ok(Json(ConfigResponse {
        success: true,
        config,
    }))
}
