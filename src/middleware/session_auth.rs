//! Session-based authentication middleware.
//!
//! Validates the session cookie on every protected request and injects the
//! signed-in account into request extensions. Nothing about the session is
//! kept in process-wide state.
//!
//! # Session Flow
//!
//! 1. User signs in via GitHub OAuth or a personal access token
//! 2. Server creates a session and sets the `abandoned_session` cookie
//! 3. Subsequent requests include the cookie, validated by this middleware
//! 4. Session expires after the configured duration or on logout
//!
//! # Security Model
//!
//! - Session tokens are cryptographically random (nanoid)
//! - Only a SHA-256 hash of the token is stored server-side
//! - Cookie is HttpOnly, Secure (behind https), SameSite=Lax

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::{error::Error, models::User, AppState};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "abandoned_session";

/// Account context injected into request extensions after successful session validation.
#[derive(Clone, Debug)]
pub struct SessionUser {
    /// The signed-in account, including its GitHub credential
    pub user: User,
}

impl SessionUser {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }
}

/// Middleware that requires a valid session.
///
/// # Errors
///
/// Returns 401 Unauthorized if:
/// - No session cookie present
/// - Session not found in database
/// - Session is expired
/// - User not found
///
/// # Example
///
/// ```rust,ignore
/// use axum::{Router, middleware};
/// use abandoned::middleware::require_session;
///
/// let app = Router::new()
///     .route("/api/repositories", get(list_repositories))
///     .layer(middleware::from_fn_with_state(state.clone(), require_session));
/// ```
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let token = jar
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .ok_or(Error::Unauthenticated)?;

    let (_, user) = state.auth.validate_session(&token).await?;

    req.extensions_mut().insert(SessionUser { user });

    Ok(next.run(req).await)
}
