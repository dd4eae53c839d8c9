//! Recording ticket client implementing the TicketClient port.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use conflux::domain::ports::ticket_client::{
    NewTicket, SessionToken, TicketClient, TicketError, TicketResult, TicketUpdate,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TicketOp {
    Create { title: String, severity: Option<u8> },
    Comment { ticket_id: i64, text: String },
    Close { ticket_id: i64 },
}

pub struct RecordingTicketClient {
    pub ops: Mutex<Vec<TicketOp>>,
    next_id: AtomicI64,
    pub fail_create: AtomicBool,
    pub fail_comment: AtomicBool,
}

impl RecordingTicketClient {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(101),
            fail_create: AtomicBool::new(false),
            fail_comment: AtomicBool::new(false),
        }
    }

    pub fn ops(&self) -> Vec<TicketOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, TicketOp::Create { .. }))
            .count()
    }

    pub fn comments(&self) -> Vec<String> {
        self.ops()
            .iter()
            .filter_map(|op| match op {
                TicketOp::Comment { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, TicketOp::Close { .. }))
            .count()
    }
}

#[async_trait]
impl TicketClient for RecordingTicketClient {
    async fn open_session(&self) -> TicketResult<SessionToken> {
        Ok(SessionToken::new("session-test"))
    }

    async fn close_session(&self, _session: &SessionToken) -> TicketResult<()> {
        Ok(())
    }

    async fn create_ticket(&self, _session: &SessionToken, ticket: &NewTicket) -> TicketResult<i64> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TicketError::Transport("create disabled".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.ops.lock().unwrap().push(TicketOp::Create {
            title: ticket.title.clone(),
            severity: ticket.severity,
        });
        Ok(id)
    }

    async fn get_ticket(&self, _session: &SessionToken, ticket_id: i64) -> TicketResult<Value> {
        Ok(json!({ "id": ticket_id }))
    }

    async fn update_ticket(
        &self,
        _session: &SessionToken,
        _ticket_id: i64,
        _update: &TicketUpdate,
    ) -> TicketResult<()> {
        Ok(())
    }

    async fn add_comment(
        &self,
        _session: &SessionToken,
        ticket_id: i64,
        comment: &str,
    ) -> TicketResult<()> {
        if self.fail_comment.load(Ordering::SeqCst) {
            return Err(TicketError::Transport("comments disabled".to_string()));
        }
        self.ops.lock().unwrap().push(TicketOp::Comment {
            ticket_id,
            text: comment.to_string(),
        });
        Ok(())
    }

    async fn close_ticket(&self, _session: &SessionToken, ticket_id: i64) -> TicketResult<()> {
        self.ops.lock().unwrap().push(TicketOp::Close { ticket_id });
        Ok(())
    }
}
