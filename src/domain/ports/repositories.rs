//! Relational repository ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    CorrelationRule, ErrorLog, EventRecord, EventStatus, IngressLog, IngressStatus, LevelSubRule,
    MonitorTool, MonitorToolIp, NewEventRecord, NewIngressLog, PipelineRule,
};
use crate::domain::models::correlation_rule::NewCorrelationRule;

/// Result of a non-blocking row-exclusive claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The row is now exclusively held by the caller until the lease ends.
    Claimed,
    /// Another holder has a live lease on the row.
    Contended,
    /// The row does not exist.
    Missing,
}

/// Repository for [`EventRecord`] rows.
#[async_trait]
pub trait EventRecordRepository: Send + Sync {
    async fn create(&self, record: &NewEventRecord) -> DomainResult<EventRecord>;

    async fn get(&self, id: i64) -> DomainResult<Option<EventRecord>>;

    /// Persist status, retry counter and extras.
    async fn update(&self, record: &EventRecord) -> DomainResult<()>;

    /// Try to take the row-exclusive lease. Never blocks.
    async fn claim(&self, id: i64, holder: &str, until: DateTime<Utc>) -> DomainResult<ClaimOutcome>;

    /// Drop the lease if still held by `holder`.
    async fn release(&self, id: i64, holder: &str) -> DomainResult<()>;

    /// Alerted down events whose extras carry the given ticket id.
    async fn find_alerted_down_by_ticket(&self, ticket_id: i64) -> DomainResult<Vec<EventRecord>>;

    /// Purge terminal-status events created before the cutoff. Returns the
    /// number of deleted rows.
    async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}

/// Repository for [`IngressLog`] rows.
#[async_trait]
pub trait IngressLogRepository: Send + Sync {
    async fn create(&self, log: &NewIngressLog) -> DomainResult<IngressLog>;

    async fn get(&self, id: i64) -> DomainResult<Option<IngressLog>>;

    async fn set_status(
        &self,
        id: i64,
        status: IngressStatus,
        failure_reason: &str,
    ) -> DomainResult<()>;

    async fn claim(&self, id: i64, holder: &str, until: DateTime<Utc>) -> DomainResult<ClaimOutcome>;

    async fn release(&self, id: i64, holder: &str) -> DomainResult<()>;

    /// Purge logs created before the cutoff that never produced an event.
    async fn delete_orphans_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}

/// Repository for the deduplicated error log.
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    /// Insert the (event, status, description) row, or bump its repeat count
    /// and clear `resolved` if it already exists. Returns the row after the
    /// upsert.
    async fn record(
        &self,
        event_record_id: i64,
        event_status: EventStatus,
        error_desc: &str,
    ) -> DomainResult<ErrorLog>;
}

/// Repository for monitor tools and correlation configuration.
///
/// Read-mostly during event processing; the write surface below exists for
/// bootstrap and fixtures.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_tools(&self) -> DomainResult<Vec<MonitorTool>>;

    async fn tool_by_name(&self, name: &str) -> DomainResult<Option<MonitorTool>>;

    /// Tool mapped to a source IP, if the IP is registered and mapped.
    async fn tool_for_ip(&self, ip: &str) -> DomainResult<Option<MonitorTool>>;

    /// Register a source IP, unmapped, if it is not known yet.
    async fn register_ip(&self, ip: &str) -> DomainResult<MonitorToolIp>;

    /// Exact (tool, title) rule.
    async fn rule_for(
        &self,
        monitor_tool_id: i64,
        event_title: &str,
    ) -> DomainResult<Option<CorrelationRule>>;

    async fn level_sub_rule(
        &self,
        correlation_rule_id: i64,
        event_level: &str,
    ) -> DomainResult<Option<LevelSubRule>>;

    /// Extraction rules of a tool, ordered by `order_no`.
    async fn pipeline_rules_for(&self, monitor_tool_id: i64) -> DomainResult<Vec<PipelineRule>>;

    async fn upsert_tool(&self, name: &str) -> DomainResult<MonitorTool>;

    async fn map_ip(&self, ip: &str, monitor_tool_id: Option<i64>) -> DomainResult<()>;

    async fn upsert_rule(&self, rule: &NewCorrelationRule) -> DomainResult<CorrelationRule>;
}
