//! Scan ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::Error;

/// Scan status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(ScanStatus::Running),
            "completed" => Some(ScanStatus::Completed),
            "failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanStatus::Running)
    }
}

/// A scan ledger record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "snake_case")]
pub struct Scan {
    pub id: String,
    pub user_id: String,

    // Timing
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    // Counts
    pub repos_scanned: i64,
    pub repos_added: i64,
    pub repos_updated: i64,
    pub repos_deleted: i64,
    pub errors_count: i64,

    /// JSON-encoded `ScanErrorDetail`
    pub error_details: Option<String>,

    /// 'running', 'completed', 'failed'
    pub status: String,
}

impl Scan {
    /// Get the typed scan status
    pub fn get_status(&self) -> Option<ScanStatus> {
        ScanStatus::from_str(&self.status)
    }

    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn is_finished(&self) -> bool {
        self.status == "completed" || self.status == "failed"
    }

    /// Parse the stored failure detail
    pub fn error_detail(&self) -> Option<ScanErrorDetail> {
        self.error_details
            .as_ref()
            .and_then(|s| serde_json::from_str(s).ok())
    }
}

/// Counts recorded against a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub scanned: i64,
    pub added: i64,
    pub updated: i64,
    pub deleted: i64,
    /// Items dropped after a per-item failure
    pub errors: i64,
}

/// Structured failure payload stored on a failed scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanErrorDetail {
    pub message: String,
    /// Debug rendering of the error, including its source chain
    pub trace: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScanErrorDetail {
    /// Detail for a failure that has no underlying error value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            trace: Some(format!("{:?}", err)),
            timestamp: Utc::now(),
        }
    }
}
