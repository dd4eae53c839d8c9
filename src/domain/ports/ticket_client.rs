//! ITSM ticket client port.
//!
//! Session-based: every interaction opens a session token, performs its
//! calls, and kills the session. Ticket creation is not idempotent on the
//! remote side; callers must guard against double-creation themselves.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Request-type id the correlator identifies itself with.
pub const REQUESTER_SOURCE_ID: i64 = 8;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket API call failed [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("Ticket transport error: {0}")]
    Transport(String),
}

pub type TicketResult<T> = Result<T, TicketError>;

/// Opaque session token returned by `open_session`.
#[derive(Debug, Clone)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// External ticket lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    New = 1,
    ProcessingAssigned = 2,
    ProcessingPlanned = 3,
    Pending = 4,
    Solved = 5,
    Closed = 6,
}

impl TicketState {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Correlator severity (1 highest .. 4 lowest) mapped to the external
/// scale (4 highest .. 1 lowest). Out-of-range values count as severity 4.
pub fn external_severity(severity: u8) -> u8 {
    match severity {
        1 => 4,
        2 => 3,
        3 => 2,
        _ => 1,
    }
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub assigned_group_uid: Option<i64>,
    /// Already on the external scale; see [`external_severity`].
    pub severity: Option<u8>,
    pub custom_field: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
    pub description: Option<String>,
    pub state: Option<TicketState>,
    pub assigned_group_uid: Option<i64>,
}

/// Port to the external ITSM.
#[async_trait]
pub trait TicketClient: Send + Sync {
    async fn open_session(&self) -> TicketResult<SessionToken>;

    async fn close_session(&self, session: &SessionToken) -> TicketResult<()>;

    /// Create a ticket; returns the external ticket id.
    async fn create_ticket(&self, session: &SessionToken, ticket: &NewTicket) -> TicketResult<i64>;

    async fn get_ticket(&self, session: &SessionToken, ticket_id: i64) -> TicketResult<Value>;

    async fn update_ticket(
        &self,
        session: &SessionToken,
        ticket_id: i64,
        update: &TicketUpdate,
    ) -> TicketResult<()>;

    /// Add a follow-up comment to a ticket.
    async fn add_comment(
        &self,
        session: &SessionToken,
        ticket_id: i64,
        comment: &str,
    ) -> TicketResult<()>;

    /// Mark the ticket solved.
    async fn close_ticket(&self, session: &SessionToken, ticket_id: i64) -> TicketResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_map_inverts_the_scale() {
        assert_eq!(external_severity(1), 4);
        assert_eq!(external_severity(2), 3);
        assert_eq!(external_severity(3), 2);
        assert_eq!(external_severity(4), 1);
        // out of range treated as lowest severity
        assert_eq!(external_severity(0), 1);
        assert_eq!(external_severity(9), 1);
    }
}
