//! Correlation rule models.
//!
//! Rules are keyed by (monitor tool, event title); the wildcard title `*`
//! is the tool default. Level sub-rules override the severity and the
//! do-not-create-ticket flag for specific event levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wildcard title marking a tool-default rule.
pub const WILDCARD_EVENT_TITLE: &str = "*";

pub const DEFAULT_PARENT_CHILD_LOOKUP: bool = true;
pub const DEFAULT_WAIT_TIME_IN_SECONDS: u32 = 150;
pub const DEFAULT_DO_NOT_CREATE_TICKET: bool = true;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub id: i64,
    pub monitor_tool_id: i64,
    pub event_title: String,

    /// When set, a parent event is looked up before ticketing.
    pub parent_child_lookup_required: bool,
    /// Seconds to wait before raising a ticket for this event.
    pub wait_time_in_seconds: u32,
    /// Declares whether the tool sends up events. Informational only.
    pub up_event_flag: bool,
    /// Default flag used when no level sub-rule matches.
    pub do_not_create_ticket_flag: bool,

    pub itsm_assignment_group_uid: Option<i64>,
    pub itsm_severity: Option<u8>,
    pub itsm_title: Option<String>,
    pub itsm_desc: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create or replace a [`CorrelationRule`].
#[derive(Debug, Clone)]
pub struct NewCorrelationRule {
    pub monitor_tool_id: i64,
    pub event_title: String,
    pub parent_child_lookup_required: bool,
    pub wait_time_in_seconds: u32,
    pub up_event_flag: bool,
    pub do_not_create_ticket_flag: bool,
    pub itsm_assignment_group_uid: Option<i64>,
    pub itsm_severity: Option<u8>,
    pub itsm_title: Option<String>,
    pub itsm_desc: Option<String>,
}

impl NewCorrelationRule {
    pub fn with_defaults(monitor_tool_id: i64, event_title: impl Into<String>) -> Self {
        Self {
            monitor_tool_id,
            event_title: event_title.into(),
            parent_child_lookup_required: DEFAULT_PARENT_CHILD_LOOKUP,
            wait_time_in_seconds: DEFAULT_WAIT_TIME_IN_SECONDS,
            up_event_flag: true,
            do_not_create_ticket_flag: DEFAULT_DO_NOT_CREATE_TICKET,
            itsm_assignment_group_uid: None,
            itsm_severity: None,
            itsm_title: None,
            itsm_desc: None,
        }
    }
}

/// Severity / ticket-flag override for one event level of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSubRule {
    pub id: i64,
    pub correlation_rule_id: i64,
    pub event_level: String,
    pub itsm_severity: u8,
    pub do_not_create_ticket_flag: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The rule as it applies to one concrete event, after tool/title fallback
/// and level sub-rule overlay. Produced only by the rule resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveRule {
    pub parent_child_lookup_required: bool,
    pub wait_time_in_seconds: u32,
    pub do_not_create_ticket: bool,
    pub itsm_assignment_group_uid: Option<i64>,
    pub itsm_severity: Option<u8>,
    pub itsm_title: Option<String>,
    pub itsm_desc: Option<String>,
}

impl Default for EffectiveRule {
    fn default() -> Self {
        Self {
            parent_child_lookup_required: DEFAULT_PARENT_CHILD_LOOKUP,
            wait_time_in_seconds: DEFAULT_WAIT_TIME_IN_SECONDS,
            do_not_create_ticket: DEFAULT_DO_NOT_CREATE_TICKET,
            itsm_assignment_group_uid: None,
            itsm_severity: None,
            itsm_title: None,
            itsm_desc: None,
        }
    }
}

impl EffectiveRule {
    /// Build from a stored rule, applying the matching level sub-rule.
    pub fn from_rule(rule: &CorrelationRule, level_rule: Option<&LevelSubRule>) -> Self {
        Self {
            parent_child_lookup_required: rule.parent_child_lookup_required,
            wait_time_in_seconds: rule.wait_time_in_seconds,
            do_not_create_ticket: level_rule
                .map_or(rule.do_not_create_ticket_flag, |lr| lr.do_not_create_ticket_flag),
            itsm_assignment_group_uid: rule.itsm_assignment_group_uid,
            itsm_severity: level_rule.map(|lr| lr.itsm_severity).or(rule.itsm_severity),
            itsm_title: rule.itsm_title.clone(),
            itsm_desc: rule.itsm_desc.clone(),
        }
    }
}
