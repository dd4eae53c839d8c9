//! Domain errors for the conflux correlator.

use thiserror::Error;

/// Domain-level errors that can occur while correlating events.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event record not found: {0}")]
    EventRecordNotFound(i64),

    #[error("Ingress log not found: {0}")]
    IngressLogNotFound(i64),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// The same failure repeated past the accumulator threshold. Aborts the
    /// running handler; no follow-on is scheduled for the event.
    #[error("Event [{record_id}][{status}] failing with Error: {error_desc}")]
    RepeatedFailure {
        record_id: i64,
        status: String,
        error_desc: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Document store error: {0}")]
    StoreError(String),

    #[error("Ticket system error: {0}")]
    TicketError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
