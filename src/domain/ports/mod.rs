//! Ports: interfaces the services layer depends on.

pub mod cluster_lock;
pub mod event_store;
pub mod repositories;
pub mod task_queue;
pub mod ticket_client;

pub use cluster_lock::ClusterLock;
pub use event_store::{
    BulkUpdate, EventStore, SearchQuery, SearchRequest, SearchResponse, SortOrder, StoreError,
    StoreResult, StoredDocument,
};
pub use repositories::{
    ClaimOutcome, ErrorLogRepository, EventRecordRepository, IngressLogRepository, RuleRepository,
};
pub use task_queue::{follow_on_for, QueuedTask, TaskKind, TaskQueue};
pub use ticket_client::{
    external_severity, NewTicket, SessionToken, TicketClient, TicketError, TicketResult,
    TicketState, TicketUpdate, REQUESTER_SOURCE_ID,
};
