//! SQLite persistence: pool, migrations and repository implementations.

pub mod connection;
pub mod error_log_repo;
pub mod event_record_repo;
pub mod ingress_log_repo;
pub mod lock_repo;
pub mod migrations;
pub mod queue_repo;
pub mod rule_repo;

pub use connection::{create_pool, create_test_pool};
pub use error_log_repo::SqliteErrorLogRepository;
pub use event_record_repo::SqliteEventRecordRepository;
pub use ingress_log_repo::SqliteIngressLogRepository;
pub use lock_repo::SqliteClusterLock;
pub use migrations::Migrator;
pub use queue_repo::SqliteTaskQueue;
pub use rule_repo::SqliteRuleRepository;

use chrono::{DateTime, Utc};

use crate::domain::errors::DomainError;

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::SerializationError(format!("bad timestamp {value:?}: {e}")))
}
