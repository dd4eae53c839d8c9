//! Per-event error log model.
//!
//! One row per distinct (event, status, message) failure; repeats increment
//! the counter instead of adding rows. Past the repeat threshold the failure
//! is escalated to a fatal correlator error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::EventStatus;

/// Identical repeats tolerated before a failure turns fatal.
pub const ERROR_REPEAT_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLog {
    pub id: i64,
    pub event_record_id: i64,
    /// Status the event held when the failure occurred.
    pub event_status: EventStatus,
    pub error_desc: String,
    pub repeat_count: u32,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Display for ErrorLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let desc: String = self.error_desc.chars().take(15).collect();
        write!(f, "{}[{}] -> {}", self.event_record_id, self.event_status, desc)
    }
}
