//! Data models.
//!
//! Defines the row types persisted by the database layer and the
//! in-flight scan types produced by the scanner.

mod config;
mod repository;
mod scan;
mod session;
mod user;

pub use config::*;
pub use repository::*;
pub use scan::*;
pub use session::*;
pub use user::*;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new UUID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
