//! Service layer.
//!
//! Contains business logic and external service integrations:
//! - Classifier (pure abandonment policy)
//! - Source (repository source abstraction)
//! - GitHub (API client implementing the source)
//! - Scanner (list, enrich and report one scan)
//! - Registry (running scan tasks and their progress)
//! - Scans (scan lifecycle, reconciliation and ledger)
//! - Auth (GitHub sign-in and sessions)

mod auth;
pub mod classifier;
mod github;
pub mod registry;
pub mod scanner;
mod scans;
pub mod source;

pub use auth::{hash_token, AuthService, AuthorizationUrl, LoginResult};
pub use classifier::{is_abandoned, is_abandoned_at, ActivitySignal};
pub use github::{GitHubAccount, GitHubService};
pub use registry::{ProgressSnapshot, ScanProgress, ScanRegistry};
pub use scanner::{
    ItemOutcome, NoopObserver, ScanObserver, ScanPhase, ScanReport, Scanner, SkipReason,
};
pub use scans::{ScanRequest, ScanService, ScanTrigger};
pub use source::{RemoteRepository, RepositorySource, RepositoryVisibility};
