//! Scan orchestration: list, enrich, report.
//!
//! A scan lists every repository the credential can see, then looks up the
//! latest commit of each non-archived repository with bounded concurrency.
//! Each repository yields one [`ItemOutcome`]. Only whole-scan failures
//! (listing errors) are returned as `Err`. Per-item failures are recorded
//! in the [`ScanReport`] and never abort the scan.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::RepositorySnapshot;
use crate::services::source::{RemoteRepository, RepositorySource, RepositoryVisibility};

/// Coarse scan phase reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Fetching,
    Analyzing,
    Completed,
    Error,
}

/// Advisory side channel for scan progress.
pub trait ScanObserver: Send + Sync {
    fn on_status(&self, _phase: ScanPhase, _message: &str) {}

    /// Called after each repository is processed.
    fn on_progress(&self, _processed: usize, _total: usize) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Why a repository was kept without a commit date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Archived repositories are not looked up.
    Archived,
    /// The source had no commit history for the default branch.
    NoCommitData,
}

/// Result of processing one listed repository.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Enriched(RepositorySnapshot),
    Skipped {
        snapshot: RepositorySnapshot,
        reason: SkipReason,
    },
    Failed {
        github_id: i64,
        full_name: String,
        error: String,
    },
}

impl ItemOutcome {
    /// The snapshot to persist, if the item produced one.
    pub fn snapshot(&self) -> Option<&RepositorySnapshot> {
        match self {
            Self::Enriched(snapshot) | Self::Skipped { snapshot, .. } => Some(snapshot),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Everything one scan produced.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// External ids of every listed repository, including failed items.
    pub listed_ids: Vec<i64>,
    /// One outcome per listed repository, in listing order.
    pub outcomes: Vec<ItemOutcome>,
}

impl ScanReport {
    /// Snapshots of every successfully processed repository.
    pub fn snapshots(&self) -> Vec<RepositorySnapshot> {
        self.outcomes
            .iter()
            .filter_map(ItemOutcome::snapshot)
            .cloned()
            .collect()
    }

    /// Number of repositories that produced a snapshot.
    pub fn scanned_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.snapshot().is_some()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Skipped { .. }))
            .count()
    }
}

/// Drives one scan against a repository source.
#[derive(Clone)]
pub struct Scanner {
    source: Arc<dyn RepositorySource>,
    concurrency: usize,
}

impl Scanner {
    pub fn new(source: Arc<dyn RepositorySource>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run a scan for one credential.
    pub async fn scan(
        &self,
        token: &str,
        include_private: bool,
        observer: &dyn ScanObserver,
    ) -> Result<ScanReport> {
        observer.on_status(ScanPhase::Fetching, "Fetching repositories");

        let visibility = RepositoryVisibility::from_include_private(include_private);
        let repositories = match self.source.list_repositories(token, visibility).await {
            Ok(repositories) => repositories,
            Err(e) => {
                observer.on_status(ScanPhase::Error, &e.to_string());
                return Err(e);
            }
        };

        let total = repositories.len();
        let listed_ids: Vec<i64> = repositories.iter().map(|r| r.id).collect();

        if total == 0 {
            observer.on_status(ScanPhase::Completed, "No repositories found");
            return Ok(ScanReport {
                listed_ids,
                outcomes: Vec::new(),
            });
        }

        observer.on_status(
            ScanPhase::Analyzing,
            &format!("Analyzing {} repositories", total),
        );
        observer.on_progress(0, total);

        let mut outcomes = Vec::with_capacity(total);
        let mut pending = stream::iter(repositories)
            .map(|repo| self.enrich(token, repo))
            .buffered(self.concurrency);

        while let Some(outcome) = pending.next().await {
            outcomes.push(outcome);
            observer.on_progress(outcomes.len(), total);
        }

        let report = ScanReport {
            listed_ids,
            outcomes,
        };

        info!(
            total,
            scanned = report.scanned_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "Repository analysis finished"
        );

        observer.on_status(
            ScanPhase::Completed,
            &format!("Analysis completed for {} repositories", report.scanned_count()),
        );

        Ok(report)
    }

    /// Look up the latest commit for one repository.
    async fn enrich(&self, token: &str, repo: RemoteRepository) -> ItemOutcome {
        if repo.archived {
            return ItemOutcome::Skipped {
                snapshot: repo.into_snapshot(None),
                reason: SkipReason::Archived,
            };
        }

        let result = self
            .source
            .last_commit_date(token, &repo.owner, &repo.name, &repo.default_branch)
            .await;

        match result {
            Ok(date) => ItemOutcome::Enriched(repo.into_snapshot(date)),
            Err(e) if e.is_missing_data() => {
                debug!(
                    repo = %repo.full_name,
                    branch = %repo.default_branch,
                    "No commits found"
                );
                ItemOutcome::Skipped {
                    snapshot: repo.into_snapshot(None),
                    reason: SkipReason::NoCommitData,
                }
            }
            Err(e) => {
                warn!(repo = %repo.full_name, error = %e, "Failed to analyze repository");
                ItemOutcome::Failed {
                    github_id: repo.id,
                    full_name: repo.full_name,
                    error: e.to_string(),
                }
            }
        }
    }
}
