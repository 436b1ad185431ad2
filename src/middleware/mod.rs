//! HTTP middleware.
//!
//! - `session_auth` - Session cookie validation for signed-in routes
//! - `security_headers` - Response hardening headers on every route

mod security_headers;
mod session_auth;

pub use security_headers::security_headers;
pub use session_auth::{require_session, SessionUser, SESSION_COOKIE_NAME};
