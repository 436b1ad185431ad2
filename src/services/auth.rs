//! Auth service for GitHub sign-in and session management.
//!
//! Handles authentication via:
//! - GitHub OAuth (authorization code with PKCE)
//! - GitHub personal access tokens
//!
//! Successful sign-in stores the account's GitHub credentials and opens a
//! server-side session. The browser only ever holds the raw session token,
//! the database only its SHA-256 hash.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, AuthorizationCode, ClientId,
    ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{self, DbPool};
use crate::error::{Error, Result};
use crate::models::{GitHubCredentials, Session, User};
use crate::services::github::GitHubService;

/// How long a pending OAuth authorisation stays valid
const STATE_DURATION_MINUTES: i64 = 10;

/// Service for authentication and sessions.
#[derive(Clone)]
pub struct AuthService {
    db: DbPool,
    config: Arc<Config>,
    github: Arc<GitHubService>,
}

/// Where to send the browser to start an OAuth sign-in
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationUrl {
    pub url: String,
    pub state: String,
}

/// A signed-in account and its new session token
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: User,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Hash a session token for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

impl AuthService {
    pub fn new(db: DbPool, config: Arc<Config>, github: Arc<GitHubService>) -> Self {
        Self { db, config, github }
    }

    fn session_duration(&self) -> Duration {
        Duration::seconds(self.config.session.max_age_seconds as i64)
    }

    fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.config.server.public_url)
    }

    /// Build the OAuth client for the configured GitHub instance.
    fn build_oauth_client(&self) -> Result<BasicClient> {
        let github = &self.config.github;

        let client = BasicClient::new(
            ClientId::new(github.client_id.clone()),
            Some(ClientSecret::new(github.client_secret.clone())),
            AuthUrl::new(format!("{}/login/oauth/authorize", github.oauth_url))
                .map_err(|e| Error::Internal(format!("Invalid auth URL: {}", e)))?,
            Some(
                TokenUrl::new(format!("{}/login/oauth/access_token", github.oauth_url))
                    .map_err(|e| Error::Internal(format!("Invalid token URL: {}", e)))?,
            ),
        )
        .set_redirect_uri(
            RedirectUrl::new(self.redirect_uri())
                .map_err(|e| Error::Internal(format!("Invalid redirect URL: {}", e)))?,
        );

        Ok(client)
    }

    /// Generate the GitHub authorization URL and remember its CSRF state.
    pub async fn authorization_url(&self) -> Result<AuthorizationUrl> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let client = self.build_oauth_client()?;

        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.config.github.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let (url, state) = request.url();

        db::create_oauth_state(
            &self.db,
            state.secret(),
            Some(pkce_verifier.secret()),
            Utc::now() + Duration::minutes(STATE_DURATION_MINUTES),
        )
        .await?;

        Ok(AuthorizationUrl {
            url: url.to_string(),
            state: state.secret().clone(),
        })
    }

    /// Exchange an authorization code for a GitHub token and sign in.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<LoginResult> {
        let oauth_state = db::take_oauth_state(&self.db, state)
            .await?
            .ok_or_else(|| Error::InvalidInput("Unknown OAuth state".to_string()))?;

        if oauth_state.is_expired() {
            return Err(Error::TokenExpired);
        }

        let client = self.build_oauth_client()?;
        let mut token_request = client.exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = oauth_state.pkce_verifier {
            token_request = token_request.set_pkce_verifier(PkceCodeVerifier::new(verifier));
        }

        let token_response = token_request
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                warn!(error = %e, "OAuth code exchange failed");
                Error::InvalidToken
            })?;

        let now = Utc::now();
        let access_token = token_response.access_token().secret().clone();
        let access_token_expires_at = token_response
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| now + d);
        let refresh_token = token_response.refresh_token().map(|t| t.secret().clone());

        let account = self.github.get_authenticated_user(&access_token).await?;

        let user = db::upsert_user(
            &self.db,
            &GitHubCredentials {
                username: account.login,
                github_id: Some(account.id),
                access_token,
                refresh_token,
                access_token_expires_at,
                refresh_token_expires_at: None,
            },
        )
        .await?;

        info!(user_id = %user.id, username = %user.username, method = "oauth", "User authenticated");

        self.open_session(user).await
    }

    /// Sign in with a personal access token.
    pub async fn login_with_token(&self, token: &str) -> Result<LoginResult> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Validation("GitHub token is required".to_string()));
        }

        let account = self.github.get_authenticated_user(token).await?;

        let user = db::upsert_user(
            &self.db,
            &GitHubCredentials {
                username: account.login,
                github_id: Some(account.id),
                access_token: token.to_string(),
                refresh_token: None,
                access_token_expires_at: None,
                refresh_token_expires_at: None,
            },
        )
        .await?;

        info!(user_id = %user.id, username = %user.username, method = "token", "User authenticated");

        self.open_session(user).await
    }

    async fn open_session(&self, user: User) -> Result<LoginResult> {
        let session_token = nanoid::nanoid!(64);
        let expires_at = Utc::now() + self.session_duration();

        db::create_session(&self.db, &user.id, &hash_token(&session_token), expires_at).await?;

        Ok(LoginResult {
            user,
            session_token,
            expires_at,
        })
    }

    /// Resolve a raw session token to its session and user.
    ///
    /// Sessions past the halfway point of their lifetime are extended.
    pub async fn validate_session(&self, token: &str) -> Result<(Session, User)> {
        let session = db::get_session_by_hash(&self.db, &hash_token(token))
            .await?
            .ok_or(Error::Unauthenticated)?;

        if session.is_expired() {
            db::delete_session(&self.db, &session.id).await?;
            return Err(Error::TokenExpired);
        }

        let user = match db::get_user(&self.db, &session.user_id).await {
            Ok(user) => user,
            Err(Error::NotFound(_)) => return Err(Error::Unauthenticated),
            Err(e) => return Err(e),
        };

        let max_age = self.session_duration();
        if session.expires_at < Utc::now() + max_age / 2 {
            let new_expiry = Utc::now() + max_age;
            db::extend_session(&self.db, &session.id, new_expiry).await?;
            debug!(session_id = %session.id, "Session extended");
        }

        Ok((session, user))
    }

    /// End a session.
    pub async fn logout(&self, token: &str) -> Result<()> {
        db::delete_session_by_hash(&self.db, &hash_token(token)).await?;
        Ok(())
    }
}
