//! Task queue port.
//!
//! Named tasks against one entity row (event record or ingress log), pulled
//! by a pool of workers. Delivery is at-least-once: a claimed task whose
//! worker dies becomes claimable again when its lease expires; handlers are
//! idempotent, so re-delivery is safe.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{EventRecord, EventStatus, EventType};

/// The named tasks the correlator schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Materialize an ingress log into a stored event + event record.
    IngestEvent,
    /// Plant a manual resolve for a ticket named in an ingress log.
    ResolveEvent,
    NewUpEvent,
    NewDownEvent,
    SuppressedEvent,
    CreatingTicketEvent,
    AlertedEvent,
    ResolvingEvent,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IngestEvent => "ingest_event",
            Self::ResolveEvent => "resolve_event",
            Self::NewUpEvent => "new_up_event",
            Self::NewDownEvent => "new_down_event",
            Self::SuppressedEvent => "suppressed_event",
            Self::CreatingTicketEvent => "creating_ticket_event",
            Self::AlertedEvent => "alerted_event",
            Self::ResolvingEvent => "resolving_event",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ingest_event" => Some(Self::IngestEvent),
            "resolve_event" => Some(Self::ResolveEvent),
            "new_up_event" => Some(Self::NewUpEvent),
            "new_down_event" => Some(Self::NewDownEvent),
            "suppressed_event" => Some(Self::SuppressedEvent),
            "creating_ticket_event" => Some(Self::CreatingTicketEvent),
            "alerted_event" => Some(Self::AlertedEvent),
            "resolving_event" => Some(Self::ResolvingEvent),
            _ => None,
        }
    }

    /// Tasks that run against an ingress log rather than an event record.
    pub fn is_ingress_task(&self) -> bool {
        matches!(self, Self::IngestEvent | Self::ResolveEvent)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task pulled from the queue.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub id: i64,
    pub kind: TaskKind,
    pub entity_id: i64,
    pub run_at: DateTime<Utc>,
}

/// Port to the distributed task queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Schedule a task to run after `delay`.
    async fn enqueue(&self, kind: TaskKind, entity_id: i64, delay: Duration) -> DomainResult<()>;

    /// Claim up to `limit` due tasks for this worker.
    async fn claim_due(&self, holder: &str, limit: u32) -> DomainResult<Vec<QueuedTask>>;

    /// Remove a finished task.
    async fn complete(&self, task_id: i64) -> DomainResult<()>;
}

/// The follow-on an event's current state requires, with its delay.
///
/// Every non-terminal state re-enqueues its own handler; a suppressed event
/// whose down-comment is already posted polls at the slower cadence.
pub fn follow_on_for(record: &EventRecord) -> Option<(TaskKind, Duration)> {
    match (record.status, record.event_type) {
        (EventStatus::New, EventType::Down) => {
            Some((TaskKind::NewDownEvent, Duration::seconds(10)))
        }
        (EventStatus::New, EventType::Up) => Some((TaskKind::NewUpEvent, Duration::seconds(10))),
        (EventStatus::Suppressed, _) => {
            let delay = if record.extras.asset_down_comment { 30 } else { 10 };
            Some((TaskKind::SuppressedEvent, Duration::seconds(delay)))
        }
        (EventStatus::CreatingTicket, _) => {
            Some((TaskKind::CreatingTicketEvent, Duration::seconds(10)))
        }
        (EventStatus::Alerted, _) => Some((TaskKind::AlertedEvent, Duration::seconds(30))),
        (EventStatus::Resolving, _) => Some((TaskKind::ResolvingEvent, Duration::seconds(30))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EventExtras, EventRecord};

    fn record(status: EventStatus, event_type: EventType) -> EventRecord {
        EventRecord {
            id: 1,
            ingress_log_id: 1,
            monitor_tool_ip: None,
            doc_id: "dev::127.0.0.1::20240101000000000000".to_string(),
            doc_index: "events-20240101".to_string(),
            status,
            event_type,
            event_ts: Utc::now(),
            title: None,
            level: None,
            asset_unique_id: None,
            asset_type: None,
            retry_count: 0,
            extras: EventExtras::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn terminal_states_schedule_nothing() {
        for status in [EventStatus::Resolved, EventStatus::Deduped, EventStatus::Error] {
            assert!(follow_on_for(&record(status, EventType::Down)).is_none());
        }
    }

    #[test]
    fn neutral_new_events_schedule_nothing() {
        assert!(follow_on_for(&record(EventStatus::New, EventType::Neutral)).is_none());
    }

    #[test]
    fn suppressed_slows_down_after_the_down_comment() {
        let mut r = record(EventStatus::Suppressed, EventType::Down);
        let (kind, delay) = follow_on_for(&r).unwrap();
        assert_eq!(kind, TaskKind::SuppressedEvent);
        assert_eq!(delay, Duration::seconds(10));

        r.extras.asset_down_comment = true;
        let (_, delay) = follow_on_for(&r).unwrap();
        assert_eq!(delay, Duration::seconds(30));
    }
}
