//! Application state.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::db::DbPool;
use crate::models::ScanErrorDetail;
use crate::services::{AuthService, GitHubService, RepositorySource, ScanService, Scanner};
use crate::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// GitHub API service.
    pub github: Arc<GitHubService>,
    /// Authentication service.
    pub auth: AuthService,
    /// Scan lifecycle service.
    pub scans: ScanService,
}

impl AppState {
    /// Create a new application state, opening the database and wiring services.
    pub async fn new(config: Config) -> Result<Self> {
        let db = crate::db::init_pool(&config.database.path).await?;
        crate::db::initialize_schema(&db).await?;

        // No scan task survives a restart
        let detail = ScanErrorDetail::new("Scan interrupted by server restart");
        let interrupted = crate::db::fail_interrupted_scans(&db, &detail).await?;
        if interrupted > 0 {
            warn!(count = interrupted, "Failed scans left running by a previous process");
        }

        Ok(Self::with_db(config, db))
    }

    /// Wire services around an existing pool, scanning through GitHub.
    pub fn with_db(config: Config, db: DbPool) -> Self {
        let github = Arc::new(
            GitHubService::with_base_url(&config.github.api_url)
                .with_page_size(config.scan.page_size),
        );
        let source: Arc<dyn RepositorySource> = github.clone();
        Self::assemble(config, db, github, source)
    }

    /// Wire services with a custom repository source for scans.
    pub fn with_source(config: Config, db: DbPool, source: Arc<dyn RepositorySource>) -> Self {
        let github = Arc::new(
            GitHubService::with_base_url(&config.github.api_url)
                .with_page_size(config.scan.page_size),
        );
        Self::assemble(config, db, github, source)
    }

    fn assemble(
        config: Config,
        db: DbPool,
        github: Arc<GitHubService>,
        source: Arc<dyn RepositorySource>,
    ) -> Self {
        let config = Arc::new(config);
        let scanner = Scanner::new(source, config.scan.concurrency);

        let auth = AuthService::new(db.clone(), config.clone(), github.clone());
        let scans = ScanService::new(db.clone(), scanner);

        Self {
            db,
            config,
            github,
            auth,
            scans,
        }
    }
}
