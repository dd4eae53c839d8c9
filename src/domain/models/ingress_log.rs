//! Ingress log model.
//!
//! Every inbound request - HTTP event, HTTP resolve, SNMP trap - is recorded
//! as one row before any processing happens. The row is the anchor for the
//! ingest task and derives the stored document's id and index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::{event_id_for, event_index_for};

/// How the request reached the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressMethod {
    Get,
    Post,
    Put,
    Snmp,
}

impl IngressMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Snmp => "snmp",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "snmp" => Some(Self::Snmp),
            _ => None,
        }
    }

    /// Methods that may carry an event payload.
    pub fn is_valid_event_method(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Snmp)
    }
}

/// What the request asks the correlator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressTask {
    Event,
    Resolve,
}

impl IngressTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Resolve => "resolve",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "event" => Some(Self::Event),
            "resolve" => Some(Self::Resolve),
            _ => None,
        }
    }
}

/// Processing status of the logged request. Immutable once terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressStatus {
    New,
    InProgress,
    Failed,
    Completed,
}

impl IngressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "in_progress" => Some(Self::InProgress),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressLog {
    pub id: i64,
    pub remote_ip: String,
    pub method: IngressMethod,
    pub task: IngressTask,
    pub task_data: Value,
    pub status: IngressStatus,
    pub failure_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngressLog {
    /// Document id for the event this log materializes, if it is one.
    pub fn event_id(&self, environment: &str) -> Option<String> {
        (self.task == IngressTask::Event)
            .then(|| event_id_for(environment, &self.remote_ip, self.created_at))
    }

    /// Index the event document lands in, derived from the received time.
    pub fn event_index(&self) -> Option<String> {
        (self.task == IngressTask::Event).then(|| event_index_for(self.created_at))
    }
}

/// Fields needed to create an [`IngressLog`].
#[derive(Debug, Clone)]
pub struct NewIngressLog {
    pub remote_ip: String,
    pub method: IngressMethod,
    pub task: IngressTask,
    pub task_data: Value,
}

impl std::fmt::Display for IngressLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}][{}]",
            self.remote_ip,
            self.task.as_str(),
            self.method.as_str()
        )
    }
}
