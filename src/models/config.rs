//! Per-account configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{Error, Result};

/// Default abandonment threshold for new accounts.
pub const DEFAULT_THRESHOLD_MONTHS: u32 = 6;

/// Accepted range for the abandonment threshold.
pub const THRESHOLD_RANGE: std::ops::RangeInclusive<i64> = 1..=60;

/// Account configuration, one row per user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "snake_case")]
pub struct UserConfig {
    pub user_id: String,
    pub abandonment_threshold_months: i64,
    pub dashboard_public: bool,
    /// Globally unique, set only while the dashboard is public
    pub dashboard_slug: Option<String>,
    pub scan_private_repos: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserConfig {
    /// Threshold as a classifier input. Stored values are range-checked on write.
    pub fn threshold_months(&self) -> u32 {
        u32::try_from(self.abandonment_threshold_months).unwrap_or(DEFAULT_THRESHOLD_MONTHS)
    }
}

/// Partial update to an account configuration
#[derive(Debug, Clone, Default)]
pub struct UpdateUserConfig {
    pub abandonment_threshold_months: Option<u32>,
    pub scan_private_repos: Option<bool>,
}

/// Validate a requested threshold, rejecting anything outside 1..=60 months.
pub fn validate_threshold(months: i64) -> Result<u32> {
    if THRESHOLD_RANGE.contains(&months) {
        Ok(months as u32)
    } else {
        Err(Error::Validation(
            "Abandonment threshold must be between 1 and 60 months".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_threshold_bounds() {
        assert_eq!(validate_threshold(1).unwrap(), 1);
        assert_eq!(validate_threshold(60).unwrap(), 60);
        assert!(matches!(validate_threshold(0), Err(Error::Validation(_))));
        assert!(matches!(validate_threshold(61), Err(Error::Validation(_))));
        assert!(matches!(validate_threshold(-3), Err(Error::Validation(_))));
    }
}
