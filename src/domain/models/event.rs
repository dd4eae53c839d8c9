//! Event domain model.
//!
//! The authoritative event lives in the document store; this module defines
//! its statuses, types, field names and the typed view (`EventDoc`) that
//! handlers read out of a stored document. The relational twin is
//! [`super::EventRecord`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};

pub const EVENT_INDEX_PREFIX: &str = "events";
pub const EVENT_INDEX_PATTERN: &str = "events-*";
pub const EVENT_ID_DATETIME_FORMAT: &str = "%Y%m%d%H%M%S%6f";
pub const INDEX_DATE_SUFFIX_FORMAT: &str = "%Y%m%d";

/// Field names used in stored event documents.
pub mod field {
    pub const EVENT_DESC: &str = "event_desc";
    pub const EVENT_DETAILS: &str = "event_details";
    pub const EVENT_LEVEL: &str = "event_level";
    pub const EVENT_STATUS: &str = "status";
    pub const EVENT_TITLE: &str = "event_title";
    pub const EVENT_TS: &str = "event_ts";
    pub const EVENT_TYPE: &str = "event_type";

    pub const ASSET_UNIQUE_ID: &str = "asset_unique_id";
    pub const ASSET_TYPE: &str = "asset_type";
    pub const ASSET_REGION: &str = "asset_region";
    pub const PARENT_ASSET_UNIQUE_ID: &str = "parent_asset_unique_id";
    pub const PARENT_ASSET_TYPE: &str = "parent_asset_type";

    pub const TOOL_IP: &str = "monitor_tool_ip";
    pub const TOOL_NAME: &str = "monitor_tool_name";
    pub const METHOD: &str = "method";
    pub const RECEIVED_TS: &str = "received_ts";
    pub const LAST_UPDATE_TS: &str = "last_update_ts";
    pub const MANUAL_RESOLVE_TS: &str = "manual_resolve_ts";
    pub const ERROR_REASON: &str = "error_reason";
    pub const RESOLVING_ACTION: &str = "resolving_action";
    pub const SUPP_TO_NEW: &str = "supp_to_new";

    pub const INITIAL_EVENT: &str = "initial_event_id";
    pub const INITIAL_EVENT_INDEX: &str = "initial_event_index";
    pub const PARENT_EVENT: &str = "parent_event_id";
    pub const PARENT_EVENT_INDEX: &str = "parent_event_index";
    pub const LINKED_EVENT: &str = "linked_event_id";
    pub const LINKED_EVENT_INDEX: &str = "linked_event_index";
    pub const ITSM_TICKET: &str = "itsm_ticket";
}

/// Status of an event in the correlation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Freshly ingested, not yet correlated.
    New,
    /// Linked to an active parent event; no own ticket.
    Suppressed,
    /// Past the ticket wait window, ticket creation pending.
    CreatingTicket,
    /// Ticket raised (or suppressed by rule); waiting for the up event.
    Alerted,
    /// Up received or manual resolve requested; children being disposed.
    Resolving,
    /// Terminal: resolved by its up event or manually.
    Resolved,
    /// Terminal: duplicate of an earlier active event.
    Deduped,
    /// Terminal: unprocessable (missing fields, missing down, ...).
    Error,
}

/// Statuses a down event can hold while its incident is still open.
pub const ACTIVE_EVENT_STATUS: [EventStatus; 4] = [
    EventStatus::New,
    EventStatus::Suppressed,
    EventStatus::CreatingTicket,
    EventStatus::Alerted,
];

/// Statuses that never transition further.
pub const COMPLETE_EVENT_STATUS: [EventStatus; 3] = [
    EventStatus::Resolved,
    EventStatus::Deduped,
    EventStatus::Error,
];

/// Everything that is not terminal: the active set plus `resolving`.
pub const NON_COMPLETE_EVENT_STATUS: [EventStatus; 5] = [
    EventStatus::New,
    EventStatus::Suppressed,
    EventStatus::CreatingTicket,
    EventStatus::Alerted,
    EventStatus::Resolving,
];

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Suppressed => "suppressed",
            Self::CreatingTicket => "creating_ticket",
            Self::Alerted => "alerted",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Deduped => "deduped",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "suppressed" => Some(Self::Suppressed),
            "creating_ticket" => Some(Self::CreatingTicket),
            "alerted" => Some(Self::Alerted),
            "resolving" => Some(Self::Resolving),
            "resolved" => Some(Self::Resolved),
            "deduped" => Some(Self::Deduped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Terminal statuses never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Deduped | Self::Error)
    }

    /// Part of the active set used for dedup / parent / up-link lookups.
    pub fn is_active(&self) -> bool {
        ACTIVE_EVENT_STATUS.contains(self)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the event says about its asset.
///
/// The wire value `<<missing>>` marks an event whose type field could not be
/// extracted; any unrecognized value maps onto it as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum EventType {
    Up,
    Down,
    Neutral,
    #[serde(rename = "<<missing>>")]
    Missing,
}

impl EventType {
    pub const MISSING_WIRE_VALUE: &'static str = "<<missing>>";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Neutral => "neutral",
            Self::Missing => Self::MISSING_WIRE_VALUE,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "neutral" => Some(Self::Neutral),
            Self::MISSING_WIRE_VALUE => Some(Self::Missing),
            _ => None,
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(Self::Missing)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an event entered `resolving`, and therefore how its children must be
/// disposed before it can itself terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvingAction {
    /// Children go back to `new`; the event itself resolves.
    New,
    /// Suppressed event whose up arrived; children must resolve first.
    Supp,
    /// Operator resolved the ticket; children are forced to manual.
    Manual,
    /// Topmost alerted event resolved; comment + close the ticket.
    CloseTicket,
}

impl ResolvingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Supp => "supp",
            Self::Manual => "manual",
            Self::CloseTicket => "close_ticket",
        }
    }
}

impl std::fmt::Display for ResolvingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view over a stored event document's source.
///
/// Every field is optional: the ingest pipeline only guarantees the ones it
/// checks, and partial updates may be observed mid-transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventDoc {
    #[serde(default)]
    pub event_title: Option<String>,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub event_level: Option<String>,
    #[serde(default)]
    pub event_desc: Option<String>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub event_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub received_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manual_resolve_ts: Option<DateTime<Utc>>,

    #[serde(default)]
    pub asset_unique_id: Option<String>,
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub asset_region: Option<String>,
    #[serde(default)]
    pub parent_asset_unique_id: Option<String>,
    #[serde(default)]
    pub parent_asset_type: Option<String>,

    #[serde(default)]
    pub monitor_tool_name: Option<String>,
    #[serde(default)]
    pub monitor_tool_ip: Option<String>,
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub initial_event_id: Option<String>,
    #[serde(default)]
    pub initial_event_index: Option<String>,
    #[serde(default)]
    pub parent_event_id: Option<String>,
    #[serde(default)]
    pub parent_event_index: Option<String>,
    #[serde(default)]
    pub linked_event_id: Option<String>,
    #[serde(default)]
    pub linked_event_index: Option<String>,

    #[serde(default)]
    pub itsm_ticket: Option<i64>,
    #[serde(default)]
    pub resolving_action: Option<ResolvingAction>,
    #[serde(default)]
    pub supp_to_new: Option<bool>,
    #[serde(default)]
    pub error_reason: Option<String>,
}

impl EventDoc {
    pub fn from_value(source: &Value) -> DomainResult<Self> {
        serde_json::from_value(source.clone()).map_err(DomainError::from)
    }

    /// Linked-event id, treating an explicit null or empty string as unset.
    pub fn linked_event(&self) -> Option<&str> {
        self.linked_event_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn parent_event(&self) -> Option<&str> {
        self.parent_event_id.as_deref().filter(|s| !s.is_empty())
    }
}

/// Index name for an event received at `ts`: `events-YYYYMMDD`.
pub fn event_index_for(ts: DateTime<Utc>) -> String {
    format!("{EVENT_INDEX_PREFIX}-{}", ts.format(INDEX_DATE_SUFFIX_FORMAT))
}

/// Document id for an event: `{env}::{source ip}::{received ts, microsecond}`.
pub fn event_id_for(environment: &str, remote_ip: &str, ts: DateTime<Utc>) -> String {
    format!("{environment}::{remote_ip}::{}", ts.format(EVENT_ID_DATETIME_FORMAT))
}

/// Whether the date-suffixed event index is older than `days` days.
pub fn event_index_is_older_than(index: &str, days: i64, today: NaiveDate) -> DomainResult<bool> {
    let suffix = index
        .strip_prefix(EVENT_INDEX_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(|| DomainError::ValidationFailed(format!("Invalid event index: {index}")))?;
    let creation_date = NaiveDate::parse_from_str(suffix, INDEX_DATE_SUFFIX_FORMAT)
        .map_err(|_| DomainError::ValidationFailed(format!("Invalid event index: {index}")))?;
    Ok(creation_date < today - chrono::Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn terminal_statuses_are_not_active() {
        for status in COMPLETE_EVENT_STATUS {
            assert!(status.is_terminal());
            assert!(!status.is_active());
        }
        assert!(!EventStatus::Resolving.is_active());
        assert!(!EventStatus::Resolving.is_terminal());
    }

    #[test]
    fn event_type_parses_unknown_values_as_missing() {
        let doc: EventDoc = serde_json::from_value(serde_json::json!({
            "event_type": "flapping",
            "status": "new",
        }))
        .unwrap();
        assert_eq!(doc.event_type, Some(EventType::Missing));
    }

    #[test]
    fn index_and_id_derivation() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 10, 30, 15).unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(event_index_for(ts), "events-20240307");
        assert_eq!(
            event_id_for("prod", "10.1.2.3", ts),
            "prod::10.1.2.3::20240307103015000042"
        );
    }

    #[test]
    fn index_age_check() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert!(event_index_is_older_than("events-20230101", 365, today).unwrap());
        assert!(!event_index_is_older_than("events-20240301", 365, today).unwrap());
        assert!(event_index_is_older_than("bogus-20240301", 1, today).is_err());
    }

    #[test]
    fn empty_link_fields_read_as_unset() {
        let doc: EventDoc = serde_json::from_value(serde_json::json!({
            "linked_event_id": "",
            "parent_event_id": null,
        }))
        .unwrap();
        assert!(doc.linked_event().is_none());
        assert!(doc.parent_event().is_none());
    }
}
