//! GitHub account models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A GitHub account that has signed in
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub id: String,
    /// GitHub login, unique
    pub username: String,
    pub github_id: Option<i64>,

    // Credentials
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the stored access token has a known expiry in the past
    pub fn access_token_expired(&self) -> bool {
        self.access_token_expires_at
            .map(|at| at <= Utc::now())
            .unwrap_or(false)
    }
}

/// Credentials obtained from GitHub for an account
#[derive(Debug, Clone)]
pub struct GitHubCredentials {
    pub username: String,
    pub github_id: Option<i64>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
}
