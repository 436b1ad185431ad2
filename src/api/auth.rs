//! Authentication Routes
//!
//! GitHub sign-in and session management.
//!
//! Routes:
//! - GET /auth/login - Redirect to GitHub OAuth authorization
//! - GET /auth/callback - Handle OAuth callback
//! - POST /auth/token - Sign in with a personal access token
//! - POST /auth/logout - End session
//! - GET /auth/me - Get current user info

use axum::{
    extract::{Extension, Query, State},
    middleware,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::middleware::{require_session, SessionUser, SESSION_COOKIE_NAME};
use crate::services::LoginResult;
use crate::{AppState, Result};

/// Where the browser lands after a successful OAuth sign-in.
const POST_LOGIN_REDIRECT: &str = "/dashboard";

/// Build authentication routes.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Public routes
        .route("/login", get(login_redirect))
        .route("/callback", get(oauth_callback))
        .route("/token", post(token_login))
        .route("/logout", post(logout))
        // Protected routes (require session)
        .route(
            "/me",
            get(get_current_user).layer(middleware::from_fn_with_state(state, require_session)),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenLoginRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: UserSummary,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub id: String,
    pub username: String,
    pub github_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start the GitHub OAuth flow.
///
/// GET /auth/login
#[axum::debug_handler]
async fn login_redirect(State(state): State<AppState>) -> Result<Redirect> {
    let authorization = state.auth.authorization_url().await?;
    Ok(Redirect::temporary(&authorization.url))
}

/// Handle the GitHub OAuth callback.
///
/// GET /auth/callback
///
/// Exchanges the authorization code, opens a session and redirects to the
/// dashboard. Provider-reported errors are passed back on the query string.
#[axum::debug_handler]
async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(CookieJar, Redirect)> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_else(|| error.clone());
        warn!(error = %error, description = %description, "OAuth provider returned error");
        let target = format!("/?error={}", urlencoding::encode(&description));
        return Ok((jar, Redirect::to(&target)));
    }

    let code = query
        .code
        .ok_or_else(|| crate::Error::InvalidInput("Missing authorization code".to_string()))?;
    let oauth_state = query
        .state
        .ok_or_else(|| crate::Error::InvalidInput("Missing OAuth state".to_string()))?;

    let login = state.auth.exchange_code(&code, &oauth_state).await?;
    let jar = jar.add(session_cookie(&state, &login));

    Ok((jar, Redirect::to(POST_LOGIN_REDIRECT)))
}

/// Sign in with a GitHub personal access token.
///
/// POST /auth/token
#[axum::debug_handler]
async fn token_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<TokenLoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let login = state.auth.login_with_token(&request.token).await?;
    let jar = jar.add(session_cookie(&state, &login));

    Ok((
        jar,
        Json(LoginResponse {
            success: true,
            user: UserSummary {
                id: login.user.id,
                username: login.user.username,
            },
            expires_at: login.expires_at,
        }),
    ))
}

/// Logout.
///
/// POST /auth/logout
///
/// Clears the session cookie and invalidates the session server-side.
#[axum::debug_handler]
async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<impl IntoResponse> {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        state.auth.logout(cookie.value()).await?;
    }

    let cookie = Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();

    let jar = jar.add(cookie);

    Ok((
        jar,
        Json(serde_json::json!({
            "success": true,
            "message": "Logged out successfully"
        })),
    ))
}

/// Get current authenticated user information.
///
/// GET /auth/me
#[axum::debug_handler]
async fn get_current_user(
    Extension(session): Extension<SessionUser>,
) -> Json<CurrentUserResponse> {
    let user = session.user;
    Json(CurrentUserResponse {
        id: user.id,
        username: user.username,
        github_id: user.github_id,
        created_at: user.created_at,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn session_cookie(state: &AppState, login: &LoginResult) -> Cookie<'static> {
    let max_age = i64::try_from(state.config.session.max_age_seconds).unwrap_or(i64::MAX);

    Cookie::build((SESSION_COOKIE_NAME, login.session_token.clone()))
        .path("/")
        .http_only(true)
        .secure(state.config.secure_cookies())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age))
        .build()
}
