//! Scan lifecycle service.
//!
//! Starts scans for an account, runs them as registered background tasks,
//! reconciles the stored repository set with the scan report, and records
//! the outcome in the scan ledger.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::db::{self, DbPool};
use crate::error::{Error, Result};
use crate::models::{Scan, ScanCounts, ScanErrorDetail, User};
use crate::services::classifier::is_abandoned;
use crate::services::registry::{ProgressSnapshot, ScanRegistry};
use crate::services::scanner::{ScanObserver, ScanPhase, Scanner};

/// Result of asking for a new scan.
#[derive(Debug, Clone)]
pub enum ScanTrigger {
    /// A new scan was recorded and handed to a background task.
    Started(Scan),
    /// The account already has a running scan. Nothing was created.
    AlreadyRunning(Scan),
}

/// Inputs for one scan run.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub scan_id: String,
    pub user_id: String,
    pub access_token: String,
    pub include_private: bool,
    pub threshold_months: u32,
}

/// Service for starting and tracking repository scans.
#[derive(Clone)]
pub struct ScanService {
    db: DbPool,
    scanner: Scanner,
    registry: ScanRegistry,
}

impl ScanService {
    pub fn new(db: DbPool, scanner: Scanner) -> Self {
        Self {
            db,
            scanner,
            registry: ScanRegistry::new(),
        }
    }

    pub fn registry(&self) -> &ScanRegistry {
        &self.registry
    }

    /// Start a scan for an account unless one is already running.
    ///
    /// A `running` row with no registered task is left over from a crashed
    /// task or a previous process. It is failed and a new scan starts.
    ///
    /// The running-scan check and the insert are separate statements, so two
    /// simultaneous requests can both start a scan.
    pub async fn trigger(&self, user: &User) -> Result<ScanTrigger> {
        if let Some(running) = db::get_running_scan(&self.db, &user.id).await? {
            if self.registry.is_active(&running.id) {
                info!(user_id = %user.id, scan_id = %running.id, "Scan already running");
                return Ok(ScanTrigger::AlreadyRunning(running));
            }

            warn!(user_id = %user.id, scan_id = %running.id, "Failing stale running scan");
            let detail = ScanErrorDetail::new("Scan interrupted before completion");
            match db::fail_scan(&self.db, &running.id, &detail, None).await {
                // Finished between the lookup and the update
                Ok(_) | Err(Error::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if user.access_token_expired() {
            return Err(Error::TokenExpired);
        }

        let config = db::get_or_create_config(&self.db, &user.id).await?;
        let scan = db::start_scan(&self.db, &user.id).await?;

        let request = ScanRequest {
            scan_id: scan.id.clone(),
            user_id: user.id.clone(),
            access_token: user.access_token.clone(),
            include_private: config.scan_private_repos,
            threshold_months: config.threshold_months(),
        };

        let progress = self.registry.register(&scan.id);
        let guard = self.registry.finish_on_drop(&scan.id);
        let service = self.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            service.run_task(&request, progress.as_ref()).await;
        });
        self.registry.attach(&scan.id, handle);

        info!(
            user_id = %user.id,
            scan_id = %scan.id,
            include_private = config.scan_private_repos,
            "Scan started"
        );

        Ok(ScanTrigger::Started(scan))
    }

    /// Body of a background scan task. A panic inside the scan is recorded
    /// as a failed scan instead of leaving the row `running`.
    async fn run_task(&self, request: &ScanRequest, observer: &dyn ScanObserver) {
        let outcome = AssertUnwindSafe(self.execute(request, observer))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!(scan_id = %request.scan_id, error = %e, "Failed to record scan outcome");
            }
            Err(panic) => {
                let message = format!("Scan task panicked: {}", panic_message(panic.as_ref()));
                error!(scan_id = %request.scan_id, "{}", message);
                observer.on_status(ScanPhase::Error, &message);

                let detail = ScanErrorDetail::new(message);
                if let Err(e) = db::fail_scan(&self.db, &request.scan_id, &detail, None).await {
                    error!(scan_id = %request.scan_id, error = %e, "Failed to record scan panic");
                }
            }
        }
    }

    /// Run one scan to its terminal ledger state.
    ///
    /// Returns the final ledger row, completed or failed. `Err` means the
    /// outcome itself could not be recorded.
    pub async fn execute(&self, request: &ScanRequest, observer: &dyn ScanObserver) -> Result<Scan> {
        let report = match self
            .scanner
            .scan(&request.access_token, request.include_private, observer)
            .await
        {
            Ok(report) => report,
            Err(e) => return self.record_failure(request, e, None, observer).await,
        };

        let snapshots = report.snapshots();
        let mut counts = ScanCounts {
            scanned: snapshots.len() as i64,
            errors: report.failed_count() as i64,
            ..Default::default()
        };

        // Upsert strictly before delete-stale
        let summary = match db::upsert_repositories(&self.db, &request.user_id, &snapshots).await {
            Ok(summary) => summary,
            Err(e) => return self.record_failure(request, e, Some(counts), observer).await,
        };
        counts.added = summary.added as i64;
        counts.updated = summary.updated as i64;

        // The keep-set is the full listing, so an item that failed enrichment
        // keeps its previously stored record. An empty listing deletes nothing.
        if report.listed_ids.is_empty() {
            info!(scan_id = %request.scan_id, "Empty listing, keeping stored repositories");
        } else {
            let deleted = match db::delete_stale_repositories(
                &self.db,
                &request.user_id,
                &report.listed_ids,
            )
            .await
            {
                Ok(deleted) => deleted,
                Err(e) => return self.record_failure(request, e, Some(counts), observer).await,
            };
            counts.deleted = deleted as i64;
        }

        let abandoned = summary
            .repositories
            .iter()
            .filter(|r| is_abandoned(r.activity(), request.threshold_months))
            .count();

        info!(
            scan_id = %request.scan_id,
            scanned = counts.scanned,
            added = counts.added,
            updated = counts.updated,
            deleted = counts.deleted,
            errors = counts.errors,
            abandoned,
            "Scan completed"
        );

        db::complete_scan(&self.db, &request.scan_id, counts).await
    }

    async fn record_failure(
        &self,
        request: &ScanRequest,
        err: Error,
        partial: Option<ScanCounts>,
        observer: &dyn ScanObserver,
    ) -> Result<Scan> {
        warn!(scan_id = %request.scan_id, error = %err, "Scan failed");
        observer.on_status(ScanPhase::Error, &err.to_string());

        let detail = ScanErrorDetail::from_error(&err);
        db::fail_scan(&self.db, &request.scan_id, &detail, partial).await
    }

    /// A scan owned by the account, with live progress while it runs.
    pub async fn status(
        &self,
        scan_id: &str,
        user_id: &str,
    ) -> Result<(Scan, Option<ProgressSnapshot>)> {
        let scan = db::get_scan_for_user(&self.db, scan_id, user_id).await?;
        let progress = if scan.is_running() {
            self.registry.progress(scan_id)
        } else {
            None
        };
        Ok((scan, progress))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory, upsert_user, RepositoryFilter};
    use crate::models::{GitHubCredentials, ScanStatus};
    use crate::services::scanner::testing::{remote, CommitScript, FakeSource};
    use crate::services::scanner::NoopObserver;
    use crate::services::source::RemoteRepository;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    async fn setup(source: FakeSource) -> (ScanService, User) {
        let pool = init_memory().await.unwrap();
        let user = upsert_user(
            &pool,
            &GitHubCredentials {
                username: "octocat".to_string(),
                github_id: Some(1),
                access_token: "gho_test".to_string(),
                refresh_token: None,
                access_token_expires_at: None,
                refresh_token_expires_at: None,
            },
        )
        .await
        .unwrap();
        let service = ScanService::new(pool, Scanner::new(Arc::new(source), 2));
        (service, user)
    }

    async fn run(service: &ScanService, user: &User) -> Scan {
        let scan = db::start_scan(&service.db, &user.id).await.unwrap();
        let request = ScanRequest {
            scan_id: scan.id,
            user_id: user.id.clone(),
            access_token: user.access_token.clone(),
            include_private: false,
            threshold_months: 6,
        };
        service.execute(&request, &NoopObserver).await.unwrap()
    }

    async fn wait_finished(service: &ScanService, scan_id: &str, user_id: &str) -> Scan {
        for _ in 0..100 {
            let (scan, _) = service.status(scan_id, user_id).await.unwrap();
            if scan.is_finished() {
                return scan;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("scan {} did not finish", scan_id);
    }

    fn stored_ids(repos: &[crate::models::Repository]) -> Vec<i64> {
        let mut ids: Vec<i64> = repos.iter().map(|r| r.github_id).collect();
        ids.sort();
        ids
    }

    fn source_with(repositories: Vec<RemoteRepository>) -> FakeSource {
        FakeSource {
            repositories,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_enrichment_failure_still_completes() {
        let (service, user) = setup(FakeSource {
            repositories: vec![remote(1, false), remote(2, false)],
            commits: [
                (1, CommitScript::Date(Some(Utc::now() - Duration::days(400)))),
                (2, CommitScript::NetworkError),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        })
        .await;

        let scan = run(&service, &user).await;

        assert_eq!(scan.get_status(), Some(ScanStatus::Completed));
        assert_eq!(scan.repos_scanned, 1);
        assert_eq!(scan.repos_added, 1);
        assert_eq!(scan.errors_count, 1);

        let stored = db::list_repositories(&service.db, &user.id, RepositoryFilter::All)
            .await
            .unwrap();
        assert_eq!(stored_ids(&stored), vec![1]);
    }

    #[tokio::test]
    async fn test_reconciliation_deletes_unlisted() {
        let (service, user) = setup(source_with(vec![
            remote(1, false),
            remote(2, false),
            remote(3, false),
        ]))
        .await;
        run(&service, &user).await;

        let service = ScanService {
            scanner: Scanner::new(
                Arc::new(source_with(vec![remote(1, false), remote(2, false)])),
                2,
            ),
            ..service
        };
        let scan = run(&service, &user).await;

        assert_eq!(scan.repos_deleted, 1);
        assert_eq!(scan.repos_updated, 2);
        assert_eq!(scan.repos_added, 0);

        let stored = db::list_repositories(&service.db, &user.id, RepositoryFilter::All)
            .await
            .unwrap();
        assert_eq!(stored_ids(&stored), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_item_keeps_stored_record() {
        let (service, user) = setup(source_with(vec![remote(1, false), remote(2, false)])).await;
        run(&service, &user).await;

        let service = ScanService {
            scanner: Scanner::new(
                Arc::new(FakeSource {
                    repositories: vec![remote(1, false), remote(2, false)],
                    commits: [(2, CommitScript::NetworkError)].into_iter().collect(),
                    ..Default::default()
                }),
                2,
            ),
            ..service
        };
        let scan = run(&service, &user).await;

        assert_eq!(scan.repos_deleted, 0);
        let stored = db::list_repositories(&service.db, &user.id, RepositoryFilter::All)
            .await
            .unwrap();
        assert_eq!(stored_ids(&stored), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_listing_keeps_stored_records() {
        let (service, user) = setup(source_with(vec![remote(1, false)])).await;
        run(&service, &user).await;

        let service = ScanService {
            scanner: Scanner::new(Arc::new(FakeSource::default()), 2),
            ..service
        };
        let scan = run(&service, &user).await;

        assert_eq!(scan.get_status(), Some(ScanStatus::Completed));
        assert_eq!(scan.repos_scanned, 0);
        assert_eq!(scan.repos_deleted, 0);
        assert_eq!(db::count_repositories(&service.db, &user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_failure_fails_scan_with_partial_counts() {
        let (service, user) = setup(FakeSource {
            repositories: vec![remote(1, false), remote(2, false)],
            commits: [(2, CommitScript::NetworkError)].into_iter().collect(),
            ..Default::default()
        })
        .await;
        sqlx::query("DROP TABLE repositories")
            .execute(&service.db)
            .await
            .unwrap();

        let scan = run(&service, &user).await;

        assert_eq!(scan.get_status(), Some(ScanStatus::Failed));
        assert!(scan.completed_at.is_some());
        assert_eq!(scan.repos_scanned, 1);
        // One enrichment failure plus the failed write
        assert_eq!(scan.errors_count, 2);
        assert_eq!(scan.repos_added, 0);

        let detail = scan.error_detail().expect("structured error detail");
        assert!(detail.message.starts_with("Database error"));
    }

    #[tokio::test]
    async fn test_listing_failure_fails_scan_and_keeps_data() {
        let (service, user) = setup(source_with(vec![remote(1, false)])).await;
        run(&service, &user).await;

        let service = ScanService {
            scanner: Scanner::new(
                Arc::new(FakeSource {
                    listing_error: Some(|| Error::InvalidToken),
                    ..Default::default()
                }),
                2,
            ),
            ..service
        };
        let scan = run(&service, &user).await;

        assert_eq!(scan.get_status(), Some(ScanStatus::Failed));
        assert_eq!(scan.errors_count, 1);
        let detail = scan.error_detail().unwrap();
        assert_eq!(detail.message, "Invalid token");
        assert_eq!(db::count_repositories(&service.db, &user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trigger_conflicts_with_running_scan() {
        let (service, user) = setup(FakeSource::default()).await;
        let running = db::start_scan(&service.db, &user.id).await.unwrap();
        service.registry().register(&running.id);

        let outcome = service.trigger(&user).await.unwrap();
        match outcome {
            ScanTrigger::AlreadyRunning(scan) => assert_eq!(scan.id, running.id),
            ScanTrigger::Started(_) => panic!("expected a conflict"),
        }

        let scans = db::list_scans(&service.db, &user.id, 10).await.unwrap();
        assert_eq!(scans.len(), 1);
    }

    #[tokio::test]
    async fn test_trigger_runs_in_background() {
        let (service, user) = setup(source_with(vec![remote(1, false), remote(2, true)])).await;

        let scan = match service.trigger(&user).await.unwrap() {
            ScanTrigger::Started(scan) => scan,
            ScanTrigger::AlreadyRunning(_) => panic!("no scan should be running"),
        };
        assert!(scan.is_running());

        let mut finished = None;
        for _ in 0..100 {
            let (current, _) = service.status(&scan.id, &user.id).await.unwrap();
            if current.is_finished() {
                finished = Some(current);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let finished = finished.expect("scan did not finish");
        assert_eq!(finished.get_status(), Some(ScanStatus::Completed));
        assert_eq!(finished.repos_scanned, 2);

        // Give the task a moment to deregister after the ledger write
        for _ in 0..100 {
            if !service.registry().is_active(&scan.id) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!service.registry().is_active(&scan.id));
    }

    #[tokio::test]
    async fn test_trigger_replaces_stale_running_scan() {
        let (service, user) = setup(source_with(vec![remote(1, false)])).await;
        // A running row with no task behind it
        let stale = db::start_scan(&service.db, &user.id).await.unwrap();

        let scan = match service.trigger(&user).await.unwrap() {
            ScanTrigger::Started(scan) => scan,
            ScanTrigger::AlreadyRunning(_) => panic!("stale scan blocked a new one"),
        };
        assert_ne!(scan.id, stale.id);

        let stale = db::get_scan(&service.db, &stale.id).await.unwrap();
        assert_eq!(stale.get_status(), Some(ScanStatus::Failed));
        assert!(stale.error_detail().unwrap().message.contains("interrupted"));

        let finished = wait_finished(&service, &scan.id, &user.id).await;
        assert_eq!(finished.get_status(), Some(ScanStatus::Completed));
    }

    #[tokio::test]
    async fn test_panicking_scan_is_failed_and_deregistered() {
        let (service, user) = setup(FakeSource {
            repositories: vec![remote(1, false)],
            commits: [(1, CommitScript::Panic)].into_iter().collect(),
            ..Default::default()
        })
        .await;

        let scan = match service.trigger(&user).await.unwrap() {
            ScanTrigger::Started(scan) => scan,
            ScanTrigger::AlreadyRunning(_) => panic!("no scan should be running"),
        };

        let finished = wait_finished(&service, &scan.id, &user.id).await;
        assert_eq!(finished.get_status(), Some(ScanStatus::Failed));
        let detail = finished.error_detail().unwrap();
        assert!(detail.message.contains("commit lookup exploded"));

        for _ in 0..100 {
            if !service.registry().is_active(&scan.id) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!service.registry().is_active(&scan.id));

        match service.trigger(&user).await.unwrap() {
            ScanTrigger::Started(next) => assert_ne!(next.id, scan.id),
            ScanTrigger::AlreadyRunning(_) => panic!("panicked scan still blocks triggers"),
        }
    }

    #[tokio::test]
    async fn test_status_is_scoped_to_owner() {
        let (service, user) = setup(FakeSource::default()).await;
        let scan = db::start_scan(&service.db, &user.id).await.unwrap();

        assert!(service.status(&scan.id, &user.id).await.is_ok());
        assert!(matches!(
            service.status(&scan.id, "another-user").await,
            Err(Error::NotFound(_))
        ));
    }
}
