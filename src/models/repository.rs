//! Repository records and scan snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::services::classifier::ActivitySignal;

/// A repository stored for an account, unique on (user_id, github_id)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "snake_case")]
pub struct Repository {
    pub id: String,
    pub user_id: String,
    /// GitHub's numeric repository id
    pub github_id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub private: bool,
    pub html_url: String,
    pub clone_url: Option<String>,

    // Activity
    pub last_commit_date: Option<DateTime<Utc>>,
    pub last_push_date: Option<DateTime<Utc>>,

    pub is_fork: bool,
    pub is_archived: bool,
    pub default_branch: String,
    pub language: Option<String>,

    // Counters
    pub stars_count: i64,
    pub forks_count: i64,
    pub open_issues_count: i64,
    pub size_kb: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_scanned_at: DateTime<Utc>,
}

impl Repository {
    /// Activity inputs for the abandonment classifier
    pub fn activity(&self) -> ActivitySignal {
        ActivitySignal {
            archived: self.is_archived,
            last_commit: self.last_commit_date,
            last_push: self.last_push_date,
        }
    }
}

/// A repository as fetched and enriched during a scan, before it is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepositorySnapshot {
    pub github_id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub private: bool,
    pub html_url: String,
    pub clone_url: Option<String>,
    pub last_commit_date: Option<DateTime<Utc>>,
    pub last_push_date: Option<DateTime<Utc>>,
    pub is_fork: bool,
    pub is_archived: bool,
    pub default_branch: String,
    pub language: Option<String>,
    pub stars_count: i64,
    pub forks_count: i64,
    pub open_issues_count: i64,
    pub size_kb: i64,
}

impl RepositorySnapshot {
    pub fn activity(&self) -> ActivitySignal {
        ActivitySignal {
            archived: self.is_archived,
            last_commit: self.last_commit_date,
            last_push: self.last_push_date,
        }
    }
}
