//! GitHub service for repository operations.
//!
//! Provides API access to GitHub for:
//! - The authenticated account
//! - Paged repository listing
//! - Latest commit lookup per branch

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::services::source::{RemoteRepository, RepositorySource, RepositoryVisibility};

const GITHUB_API_URL: &str = "https://api.github.com";

/// Largest page GitHub accepts for repository listings.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Service for GitHub API operations.
#[derive(Clone)]
pub struct GitHubService {
    client: Client,
    base_url: String,
    page_size: u32,
}

/// The account behind a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubAccount {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// GitHub repository as returned by `GET /user/repos`
#[derive(Debug, Clone, Deserialize)]
struct GitHubRepo {
    id: i64,
    name: String,
    full_name: String,
    owner: GitHubOwner,
    description: Option<String>,
    #[serde(default)]
    private: bool,
    html_url: String,
    clone_url: Option<String>,
    pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    archived: bool,
    default_branch: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    forks_count: i64,
    #[serde(default)]
    open_issues_count: i64,
    #[serde(default)]
    size: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubOwner {
    login: String,
}

impl From<GitHubRepo> for RemoteRepository {
    fn from(repo: GitHubRepo) -> Self {
        Self {
            id: repo.id,
            owner: repo.owner.login,
            name: repo.name,
            full_name: repo.full_name,
            description: repo.description,
            private: repo.private,
            html_url: repo.html_url,
            clone_url: repo.clone_url,
            pushed_at: repo.pushed_at,
            fork: repo.fork,
            archived: repo.archived,
            default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
            language: repo.language,
            stars: repo.stargazers_count,
            forks: repo.forks_count,
            open_issues: repo.open_issues_count,
            size_kb: repo.size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubCommit {
    commit: GitHubCommitDetails,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubCommitDetails {
    author: Option<GitHubCommitSignature>,
    committer: Option<GitHubCommitSignature>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubCommitSignature {
    date: Option<DateTime<Utc>>,
}

impl GitHubCommit {
    /// Committer date, falling back to the author date.
    fn date(&self) -> Option<DateTime<Utc>> {
        self.commit
            .committer
            .as_ref()
            .and_then(|c| c.date)
            .or_else(|| self.commit.author.as_ref().and_then(|a| a.date))
    }
}

impl Default for GitHubService {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubService {
    /// Create a new GitHub service against the public API.
    pub fn new() -> Self {
        Self::with_base_url(GITHUB_API_URL)
    }

    /// Create a new GitHub service with custom base URL (for Enterprise or tests).
    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("abandoned/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Set the listing page size, clamped to 1..=100.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Build headers with authentication.
    fn build_headers(&self, token: &str) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::InvalidToken)?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Get the account that owns a credential. Used to validate tokens.
    pub async fn get_authenticated_user(&self, token: &str) -> Result<GitHubAccount> {
        let url = format!("{}/user", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.build_headers(token)?)
            .send()
            .await
            .map_err(|e| Error::GitHub(format!("Request failed: {}", e)))?;

        let response = check_response(response, "user").await?;

        response
            .json()
            .await
            .map_err(|e| Error::GitHub(format!("Failed to parse response: {}", e)))
    }

    /// List all repositories visible to the credential, most recently
    /// updated first. Stops at the first short or empty page.
    pub async fn list_user_repositories(
        &self,
        token: &str,
        visibility: RepositoryVisibility,
    ) -> Result<Vec<RemoteRepository>> {
        let url = format!("{}/user/repos", self.base_url);
        let headers = self.build_headers(token)?;
        let per_page = self.page_size.to_string();

        let mut repositories = Vec::new();
        let mut page: u32 = 1;

        loop {
            let page_param = page.to_string();
            let response = self
                .client
                .get(&url)
                .headers(headers.clone())
                .query(&[
                    ("type", visibility.as_str()),
                    ("sort", "updated"),
                    ("direction", "desc"),
                    ("per_page", per_page.as_str()),
                    ("page", page_param.as_str()),
                ])
                .send()
                .await
                .map_err(|e| Error::GitHub(format!("Request failed: {}", e)))?;

            let response = check_response(response, "repository listing").await?;

            let batch: Vec<GitHubRepo> = response
                .json()
                .await
                .map_err(|e| Error::GitHub(format!("Failed to parse response: {}", e)))?;

            let count = batch.len();
            debug!(page, count, "Fetched repository page");

            repositories.extend(batch.into_iter().map(RemoteRepository::from));

            if count < self.page_size as usize {
                break;
            }
            page += 1;
        }

        info!(
            count = repositories.len(),
            visibility = visibility.as_str(),
            "Listed repositories"
        );

        Ok(repositories)
    }

    /// Date of the latest commit on a branch.
    pub async fn get_last_commit_date(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let url = format!("{}/repos/{}/{}/commits", self.base_url, owner, repo);

        let response = self
            .client
            .get(&url)
            .headers(self.build_headers(token)?)
            .query(&[("sha", branch), ("per_page", "1")])
            .send()
            .await
            .map_err(|e| Error::GitHub(format!("Request failed: {}", e)))?;

        let context = format!("commits for {}/{}@{}", owner, repo, branch);
        let response = check_response(response, &context).await?;

        let commits: Vec<GitHubCommit> = response
            .json()
            .await
            .map_err(|e| Error::GitHub(format!("Failed to parse response: {}", e)))?;

        Ok(commits.first().and_then(GitHubCommit::date))
    }
}

/// Map a non-success GitHub response onto the error taxonomy.
async fn check_response(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limited = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    let text = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED => Error::InvalidToken,
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimitExceeded,
        StatusCode::FORBIDDEN if rate_limited => Error::RateLimitExceeded,
        StatusCode::NOT_FOUND => Error::NotFound(context.to_string()),
        StatusCode::CONFLICT => Error::Conflict(format!("{}: {}", context, text)),
        _ => Error::GitHub(format!("GitHub API error {}: {}", status, text)),
    })
}

#[async_trait]
impl RepositorySource for GitHubService {
    async fn list_repositories(
        &self,
        token: &str,
        visibility: RepositoryVisibility,
    ) -> Result<Vec<RemoteRepository>> {
        self.list_user_repositories(token, visibility).await
    }

    async fn last_commit_date(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.get_last_commit_date(token, owner, repo, branch).await
    }
}
