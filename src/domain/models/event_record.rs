//! Relational twin of a stored event document.
//!
//! One row per ingested event, created together with the document. The row
//! mirrors the document's status/type/title/asset fields so that handlers and
//! operators can query without hitting the store, and carries the retry
//! counter and the ticket bookkeeping extras.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{EventStatus, EventType};

/// Ticket bookkeeping carried on the relational row.
///
/// `ticket_id == Some(0)` is the do-not-create sentinel; the comment flags
/// record which ticket follow-ups have already been posted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<i64>,
    /// A comment was added to the ticket that the asset is down.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub asset_down_comment: bool,
    /// A comment was added to the ticket that the asset is up.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub asset_up_comment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub ingress_log_id: i64,
    pub monitor_tool_ip: Option<String>,

    /// Identity of the stored document.
    pub doc_id: String,
    pub doc_index: String,

    pub status: EventStatus,
    pub event_type: EventType,
    pub event_ts: DateTime<Utc>,
    pub title: Option<String>,
    pub level: Option<String>,
    pub asset_unique_id: Option<String>,
    pub asset_type: Option<String>,

    pub retry_count: u32,
    pub extras: EventExtras,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create an [`EventRecord`]; the id and timestamps are
/// assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewEventRecord {
    pub ingress_log_id: i64,
    pub monitor_tool_ip: Option<String>,
    pub doc_id: String,
    pub doc_index: String,
    pub status: EventStatus,
    pub event_type: EventType,
    pub event_ts: DateTime<Utc>,
    pub title: Option<String>,
    pub level: Option<String>,
    pub asset_unique_id: Option<String>,
    pub asset_type: Option<String>,
}

impl std::fmt::Display for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]{}", self.doc_index, self.doc_id)
    }
}
