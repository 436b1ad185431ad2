//! Common test utilities and helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use abandoned::config::Config;
use abandoned::db::{self, DbPool};
use abandoned::models::{GitHubCredentials, Scan, User};
use abandoned::services::{hash_token, RemoteRepository, RepositorySource, RepositoryVisibility};
use abandoned::{AppState, Error, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;

pub use abandoned::middleware::SESSION_COOKIE_NAME;

// ============================================================================
// Scripted repository source
// ============================================================================

/// Repository source whose listing and commit dates are set by the test.
#[derive(Default)]
pub struct StubSource {
    repositories: Mutex<Vec<RemoteRepository>>,
    commits: Mutex<HashMap<String, Option<DateTime<Utc>>>>,
    failing_lookups: Mutex<Vec<String>>,
    listing_error: Mutex<Option<String>>,
    /// When set, listings wait for a notification before returning.
    gate: Mutex<Option<Arc<Notify>>>,
}

impl StubSource {
    /// Add a repository with the given last commit date.
    pub fn add(&self, id: i64, private: bool, last_commit: Option<DateTime<Utc>>) {
        let repo = remote(id, private);
        self.commits
            .lock()
            .unwrap()
            .insert(repo.name.clone(), last_commit);
        self.repositories.lock().unwrap().push(repo);
    }

    pub fn remove(&self, id: i64) {
        self.repositories.lock().unwrap().retain(|r| r.id != id);
    }

    /// Make the commit lookup for a repository fail with a transport error.
    pub fn fail_lookup(&self, id: i64) {
        self.failing_lookups.lock().unwrap().push(repo_name(id));
    }

    pub fn fail_listing(&self, message: &str) {
        *self.listing_error.lock().unwrap() = Some(message.to_string());
    }

    /// Hold every listing until the returned handle is notified.
    pub fn hold_listing(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl RepositorySource for StubSource {
    async fn list_repositories(
        &self,
        _token: &str,
        visibility: RepositoryVisibility,
    ) -> Result<Vec<RemoteRepository>> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let listing_error = self.listing_error.lock().unwrap().clone();
        if let Some(message) = listing_error {
            return Err(Error::GitHub(message));
        }

        let repositories = self.repositories.lock().unwrap().clone();
        Ok(repositories
            .into_iter()
            .filter(|r| visibility == RepositoryVisibility::All || !r.private)
            .collect())
    }

    async fn last_commit_date(
        &self,
        _token: &str,
        _owner: &str,
        repo: &str,
        _branch: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        if self.failing_lookups.lock().unwrap().iter().any(|r| r == repo) {
            return Err(Error::GitHub("connection reset".to_string()));
        }
        Ok(self.commits.lock().unwrap().get(repo).cloned().flatten())
    }
}

fn repo_name(id: i64) -> String {
    format!("repo-{}", id)
}

pub fn remote(id: i64, private: bool) -> RemoteRepository {
    RemoteRepository {
        id,
        owner: "octocat".to_string(),
        name: repo_name(id),
        full_name: format!("octocat/{}", repo_name(id)),
        description: Some(format!("Repository {}", id)),
        private,
        html_url: format!("https://github.com/octocat/{}", repo_name(id)),
        clone_url: Some(format!("https://github.com/octocat/{}.git", repo_name(id))),
        pushed_at: None,
        fork: false,
        archived: false,
        default_branch: "main".to_string(),
        language: Some("Rust".to_string()),
        stars: 3,
        forks: 1,
        open_issues: 0,
        size_kb: 42,
    }
}

// ============================================================================
// Test application
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub source: Arc<StubSource>,
}

impl TestApp {
    pub fn db(&self) -> &DbPool {
        &self.state.db
    }

    /// Send a request through a fresh clone of the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

pub fn test_config() -> Config {
    let mut config = Config::from_lookup(|_| None);
    config.github.client_id = "test-client".to_string();
    config.github.client_secret = "test-secret".to_string();
    config.server.public_url = "http://localhost:8080".to_string();
    config.database.path = ":memory:".to_string();
    config
}

/// Build the full router over an in-memory database and a scripted source.
pub async fn setup() -> TestApp {
    let db = db::init_memory().await.expect("Failed to create test database");
    let source = Arc::new(StubSource::default());
    let state = AppState::with_source(test_config(), db, source.clone());

    TestApp {
        router: abandoned::app(state.clone()),
        state,
        source,
    }
}

/// Create a user with a live session. Returns the user and the raw session token.
pub async fn sign_in(pool: &DbPool, username: &str) -> (User, String) {
    let user = db::upsert_user(
        pool,
        &GitHubCredentials {
            username: username.to_string(),
            github_id: Some(1000),
            access_token: format!("gho_{}", username),
            refresh_token: None,
            access_token_expires_at: None,
            refresh_token_expires_at: None,
        },
    )
    .await
    .expect("Failed to create test user");

    let token = nanoid::nanoid!(64);
    db::create_session(
        pool,
        &user.id,
        &hash_token(&token),
        Utc::now() + chrono::Duration::days(1),
    )
    .await
    .expect("Failed to create test session");

    (user, token)
}

/// Poll the ledger until the scan leaves `running`.
pub async fn wait_for_scan(pool: &DbPool, scan_id: &str) -> Scan {
    for _ in 0..200 {
        let scan = db::get_scan(pool, scan_id).await.expect("scan exists");
        if scan.is_finished() {
            return scan;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan {} did not finish", scan_id);
}

// ============================================================================
// Request helpers
// ============================================================================

fn cookie_header(session: &str) -> String {
    format!("{}={}", SESSION_COOKIE_NAME, session)
}

/// Extract JSON body from response
pub async fn extract_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Create an anonymous GET request
pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Create a GET request carrying a session cookie
pub fn get_with_session(uri: &str, session: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie_header(session))
        .body(Body::empty())
        .unwrap()
}

/// Create a POST request with JSON body and a session cookie
pub fn post_json(uri: &str, session: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, cookie_header(session))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Create an anonymous POST request with JSON body
pub fn post_json_anonymous(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}
