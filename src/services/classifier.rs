//! Abandonment classification.
//!
//! A repository is abandoned when it is not archived and its most recent
//! activity is strictly older than `now - threshold months`. Archived
//! repositories are never abandoned, and a repository with no activity
//! signal at all always is.

use chrono::{DateTime, Months, Utc};

/// Activity inputs for one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySignal {
    pub archived: bool,
    pub last_commit: Option<DateTime<Utc>>,
    pub last_push: Option<DateTime<Utc>>,
}

impl ActivitySignal {
    /// The timestamp compared against the cutoff: the commit date when
    /// known, otherwise the push date.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_commit.or(self.last_push)
    }
}

/// Oldest instant still counted as recent activity.
pub fn cutoff(now: DateTime<Utc>, threshold_months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(threshold_months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Classify against an explicit clock.
pub fn is_abandoned_at(signal: ActivitySignal, threshold_months: u32, now: DateTime<Utc>) -> bool {
    if signal.archived {
        return false;
    }

    match signal.last_activity() {
        None => true,
        Some(activity) => activity < cutoff(now, threshold_months),
    }
}

/// Classify against the current time.
pub fn is_abandoned(signal: ActivitySignal, threshold_months: u32) -> bool {
    is_abandoned_at(signal, threshold_months, Utc::now())
}
