//! API Routes
//!
//! This module combines all API routes into a single router.
//! Routes are organized by domain and apply appropriate middleware.

mod auth;
mod config;
mod public;
mod repositories;
mod scan;
pub mod status;

use axum::Router;

use crate::middleware::require_session;
use crate::AppState;

/// Build the complete API router.
///
/// Route structure:
/// - /auth/* - Authentication (public + session-protected)
/// - /api/public/:slug - Public dashboards (no auth)
/// - /api/* - Account data (session-protected)
/// - /health - Health checks (public)
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health endpoints (public)
        .merge(status::routes())
        // Authentication routes (mixed public/protected)
        .nest("/auth", auth::routes(state.clone()))
        // Public dashboards
        .merge(public::routes())
        // Protected API routes
        .nest("/api", protected_routes(state))
}

/// Protected routes that require a session.
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(scan::routes())
        .merge(repositories::routes())
        .merge(config::routes())
        .layer(axum::middleware::from_fn_with_state(state, require_session))
}
