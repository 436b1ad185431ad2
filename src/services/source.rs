//! Repository source abstraction.
//!
//! The scanner talks to the hosting service only through
//! [`RepositorySource`], so tests can substitute a scripted source and the
//! GitHub client stays a plain HTTP wrapper.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::RepositorySnapshot;

/// Which repositories a listing should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryVisibility {
    /// Public and private repositories the credential can see.
    All,
    Public,
}

impl RepositoryVisibility {
    pub fn from_include_private(include_private: bool) -> Self {
        if include_private {
            Self::All
        } else {
            Self::Public
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Public => "public",
        }
    }
}

/// Repository metadata as returned by a listing, before commit enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRepository {
    /// External numeric id
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub private: bool,
    pub html_url: String,
    pub clone_url: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub fork: bool,
    pub archived: bool,
    pub default_branch: String,
    pub language: Option<String>,
    pub stars: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub size_kb: i64,
}

impl RemoteRepository {
    /// Combine listing metadata with the looked-up commit date.
    pub fn into_snapshot(self, last_commit_date: Option<DateTime<Utc>>) -> RepositorySnapshot {
        RepositorySnapshot {
            github_id: self.id,
            name: self.name,
            full_name: self.full_name,
            description: self.description,
            private: self.private,
            html_url: self.html_url,
            clone_url: self.clone_url,
            last_commit_date,
            last_push_date: self.pushed_at,
            is_fork: self.fork,
            is_archived: self.archived,
            default_branch: self.default_branch,
            language: self.language,
            stars_count: self.stars,
            forks_count: self.forks,
            open_issues_count: self.open_issues,
            size_kb: self.size_kb,
        }
    }
}

/// A hosting service that can list an account's repositories and report
/// their latest commit.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// List every repository visible to the credential, following pagination
    /// to the end.
    ///
    /// Fails as a whole: an invalid credential or unreachable service is an
    /// error, never a partial listing.
    async fn list_repositories(
        &self,
        token: &str,
        visibility: RepositoryVisibility,
    ) -> Result<Vec<RemoteRepository>>;

    /// Date of the most recent commit on `branch`, or `None` when the
    /// branch has no commits.
    ///
    /// A missing repository or branch is reported as `Error::NotFound`, an
    /// empty repository as `Error::Conflict`. Callers decide whether those
    /// count as "no data".
    async fn last_commit_date(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<DateTime<Utc>>>;
}
