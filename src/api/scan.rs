//! Scan Routes
//!
//! Routes:
//! - POST /api/scan - Start a background scan
//! - GET /api/scan/:scan_id - Scan record with live progress
//! - GET /api/scans - Recent scan history

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::middleware::SessionUser;
use crate::models::{Scan, ScanErrorDetail};
use crate::services::{ProgressSnapshot, ScanTrigger};
use crate::{AppState, Result};

const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 100;

/// Build scan routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/scan", post(start_scan))
        .route("/scan/:scan_id", get(get_scan))
        .route("/scans", get(list_scans))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ScanStartedResponse {
    pub success: bool,
    pub scan_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ScanConflictResponse {
    pub error: String,
    pub scan_id: String,
}

#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    #[serde(flatten)]
    pub scan: Scan,
    pub error: Option<ScanErrorDetail>,
    pub progress: Option<ProgressSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ScanHistoryResponse {
    pub scans: Vec<Scan>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a scan for the signed-in account.
///
/// POST /api/scan
///
/// Returns immediately with the new scan id, or 409 with the id of the scan
/// that is already running.
#[axum::debug_handler]
async fn start_scan(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
) -> Result<Response> {
    let response = match state.scans.trigger(&session.user).await? {
        ScanTrigger::Started(scan) => Json(ScanStartedResponse {
            success: true,
            scan_id: scan.id,
            message: "Repository scan started".to_string(),
        })
        .into_response(),
        ScanTrigger::AlreadyRunning(scan) => (
            StatusCode::CONFLICT,
            Json(ScanConflictResponse {
                error: "Scan already in progress".to_string(),
                scan_id: scan.id,
            }),
        )
            .into_response(),
    };

    Ok(response)
}

/// Get a scan owned by the signed-in account.
///
/// GET /api/scan/:scan_id
#[axum::debug_handler]
async fn get_scan(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Path(scan_id): Path<String>,
) -> Result<Json<ScanStatusResponse>> {
    let (scan, progress) = state.scans.status(&scan_id, session.user_id()).await?;

    Ok(Json(ScanStatusResponse {
        error: scan.error_detail(),
        scan,
        progress,
    }))
}

/// Recent scans, newest first.
///
/// GET /api/scans?limit=10
#[axum::debug_handler]
async fn list_scans(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ScanHistoryResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let scans = db::list_scans(&state.db, session.user_id(), limit).await?;

    Ok(Json(ScanHistoryResponse { scans }))
}
