//! SQLite implementation of the RuleRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::correlation_rule::NewCorrelationRule;
use crate::domain::models::{
    CorrelationRule, LevelSubRule, MonitorTool, MonitorToolIp, PipelineRule, PipelineRuleType,
};
use crate::domain::ports::repositories::RuleRepository;

use super::parse_ts;

#[derive(Clone)]
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MonitorToolRow {
    id: i64,
    name: String,
    created_at: String,
}

impl TryFrom<MonitorToolRow> for MonitorTool {
    type Error = DomainError;

    fn try_from(row: MonitorToolRow) -> Result<Self, Self::Error> {
        Ok(MonitorTool {
            id: row.id,
            name: row.name,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MonitorToolIpRow {
    ip: String,
    monitor_tool_id: Option<i64>,
    region: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<MonitorToolIpRow> for MonitorToolIp {
    type Error = DomainError;

    fn try_from(row: MonitorToolIpRow) -> Result<Self, Self::Error> {
        Ok(MonitorToolIp {
            ip: row.ip,
            monitor_tool_id: row.monitor_tool_id,
            region: row.region,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CorrelationRuleRow {
    id: i64,
    monitor_tool_id: i64,
    event_title: String,
    parent_child_lookup_required: i64,
    wait_time_in_seconds: i64,
    up_event_flag: i64,
    do_not_create_ticket_flag: i64,
    itsm_assignment_group_uid: Option<i64>,
    itsm_severity: Option<i64>,
    itsm_title: Option<String>,
    itsm_desc: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<CorrelationRuleRow> for CorrelationRule {
    type Error = DomainError;

    fn try_from(row: CorrelationRuleRow) -> Result<Self, Self::Error> {
        Ok(CorrelationRule {
            id: row.id,
            monitor_tool_id: row.monitor_tool_id,
            event_title: row.event_title,
            parent_child_lookup_required: row.parent_child_lookup_required != 0,
            wait_time_in_seconds: u32::try_from(row.wait_time_in_seconds).unwrap_or(0),
            up_event_flag: row.up_event_flag != 0,
            do_not_create_ticket_flag: row.do_not_create_ticket_flag != 0,
            itsm_assignment_group_uid: row.itsm_assignment_group_uid,
            itsm_severity: row.itsm_severity.and_then(|v| u8::try_from(v).ok()),
            itsm_title: row.itsm_title,
            itsm_desc: row.itsm_desc,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LevelSubRuleRow {
    id: i64,
    correlation_rule_id: i64,
    event_level: String,
    itsm_severity: i64,
    do_not_create_ticket_flag: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<LevelSubRuleRow> for LevelSubRule {
    type Error = DomainError;

    fn try_from(row: LevelSubRuleRow) -> Result<Self, Self::Error> {
        Ok(LevelSubRule {
            id: row.id,
            correlation_rule_id: row.correlation_rule_id,
            event_level: row.event_level,
            itsm_severity: u8::try_from(row.itsm_severity).unwrap_or(4),
            do_not_create_ticket_flag: row.do_not_create_ticket_flag != 0,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PipelineRuleRow {
    id: i64,
    monitor_tool_id: i64,
    order_no: i64,
    rule_type: String,
    event_type_default: Option<String>,
    event_type_field: Option<String>,
    event_type_up_values: Option<String>,
    event_type_down_values: Option<String>,
    event_type_neutral_values: Option<String>,
    set_field: Option<String>,
    set_value: Option<String>,
    set_copy_from_flag: i64,
    override_flag: i64,
    ignore_empty_value_flag: i64,
    grok_field: Option<String>,
    grok_patterns: Option<String>,
    grok_pattern_definitions: Option<String>,
    remove_field: Option<String>,
    ignore_missing_flag: i64,
    if_condition: Option<String>,
    ignore_failure_flag: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PipelineRuleRow> for PipelineRule {
    type Error = DomainError;

    fn try_from(row: PipelineRuleRow) -> Result<Self, Self::Error> {
        let rule_type = PipelineRuleType::from_str(&row.rule_type).ok_or_else(|| {
            DomainError::SerializationError(format!("unknown pipeline rule type {:?}", row.rule_type))
        })?;
        let parse_json = |v: Option<String>| -> DomainResult<Option<serde_json::Value>> {
            v.map(|s| serde_json::from_str(&s).map_err(DomainError::from))
                .transpose()
        };
        Ok(PipelineRule {
            id: row.id,
            monitor_tool_id: row.monitor_tool_id,
            order_no: u16::try_from(row.order_no).unwrap_or(0),
            rule_type,
            event_type_default: row.event_type_default,
            event_type_field: row.event_type_field,
            event_type_up_values: row.event_type_up_values,
            event_type_down_values: row.event_type_down_values,
            event_type_neutral_values: row.event_type_neutral_values,
            set_field: row.set_field,
            set_value: row.set_value,
            set_copy_from_flag: row.set_copy_from_flag != 0,
            override_flag: row.override_flag != 0,
            ignore_empty_value_flag: row.ignore_empty_value_flag != 0,
            grok_field: row.grok_field,
            grok_patterns: parse_json(row.grok_patterns)?,
            grok_pattern_definitions: parse_json(row.grok_pattern_definitions)?,
            remove_field: row.remove_field,
            ignore_missing_flag: row.ignore_missing_flag != 0,
            if_condition: row.if_condition,
            ignore_failure_flag: row.ignore_failure_flag != 0,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl RuleRepository for SqliteRuleRepository {
    async fn list_tools(&self) -> DomainResult<Vec<MonitorTool>> {
        let rows: Vec<MonitorToolRow> =
            sqlx::query_as("SELECT * FROM monitor_tools ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(MonitorTool::try_from).collect()
    }

    async fn tool_by_name(&self, name: &str) -> DomainResult<Option<MonitorTool>> {
        let row: Option<MonitorToolRow> =
            sqlx::query_as("SELECT * FROM monitor_tools WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(MonitorTool::try_from).transpose()
    }

    async fn tool_for_ip(&self, ip: &str) -> DomainResult<Option<MonitorTool>> {
        let row: Option<MonitorToolRow> = sqlx::query_as(
            r#"SELECT t.id, t.name, t.created_at
               FROM monitor_tools t
               JOIN monitor_tool_ips i ON i.monitor_tool_id = t.id
               WHERE i.ip = ?"#,
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MonitorTool::try_from).transpose()
    }

    async fn register_ip(&self, ip: &str) -> DomainResult<MonitorToolIp> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT OR IGNORE INTO monitor_tool_ips (ip, monitor_tool_id, region, created_at, updated_at)
               VALUES (?, NULL, 'global', ?, ?)"#,
        )
        .bind(ip)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row: MonitorToolIpRow = sqlx::query_as("SELECT * FROM monitor_tool_ips WHERE ip = ?")
            .bind(ip)
            .fetch_one(&self.pool)
            .await?;
        MonitorToolIp::try_from(row)
    }

    async fn rule_for(
        &self,
        monitor_tool_id: i64,
        event_title: &str,
    ) -> DomainResult<Option<CorrelationRule>> {
        let row: Option<CorrelationRuleRow> = sqlx::query_as(
            "SELECT * FROM correlation_rules WHERE monitor_tool_id = ? AND event_title = ?",
        )
        .bind(monitor_tool_id)
        .bind(event_title)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CorrelationRule::try_from).transpose()
    }

    async fn level_sub_rule(
        &self,
        correlation_rule_id: i64,
        event_level: &str,
    ) -> DomainResult<Option<LevelSubRule>> {
        let row: Option<LevelSubRuleRow> = sqlx::query_as(
            "SELECT * FROM level_sub_rules WHERE correlation_rule_id = ? AND event_level = ?",
        )
        .bind(correlation_rule_id)
        .bind(event_level)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LevelSubRule::try_from).transpose()
    }

    async fn pipeline_rules_for(&self, monitor_tool_id: i64) -> DomainResult<Vec<PipelineRule>> {
        let rows: Vec<PipelineRuleRow> = sqlx::query_as(
            "SELECT * FROM pipeline_rules WHERE monitor_tool_id = ? ORDER BY order_no, id",
        )
        .bind(monitor_tool_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PipelineRule::try_from).collect()
    }

    async fn upsert_tool(&self, name: &str) -> DomainResult<MonitorTool> {
        sqlx::query("INSERT OR IGNORE INTO monitor_tools (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        self.tool_by_name(name).await?.ok_or_else(|| {
            DomainError::DatabaseError(format!("monitor tool {name:?} vanished after upsert"))
        })
    }

    async fn map_ip(&self, ip: &str, monitor_tool_id: Option<i64>) -> DomainResult<()> {
        self.register_ip(ip).await?;
        sqlx::query("UPDATE monitor_tool_ips SET monitor_tool_id = ?, updated_at = ? WHERE ip = ?")
            .bind(monitor_tool_id)
            .bind(Utc::now().to_rfc3339())
            .bind(ip)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_rule(&self, rule: &NewCorrelationRule) -> DomainResult<CorrelationRule> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO correlation_rules
               (monitor_tool_id, event_title, parent_child_lookup_required, wait_time_in_seconds,
                up_event_flag, do_not_create_ticket_flag, itsm_assignment_group_uid, itsm_severity,
                itsm_title, itsm_desc, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(monitor_tool_id, event_title) DO UPDATE SET
                 parent_child_lookup_required = excluded.parent_child_lookup_required,
                 wait_time_in_seconds = excluded.wait_time_in_seconds,
                 up_event_flag = excluded.up_event_flag,
                 do_not_create_ticket_flag = excluded.do_not_create_ticket_flag,
                 itsm_assignment_group_uid = excluded.itsm_assignment_group_uid,
                 itsm_severity = excluded.itsm_severity,
                 itsm_title = excluded.itsm_title,
                 itsm_desc = excluded.itsm_desc,
                 updated_at = excluded.updated_at"#,
        )
        .bind(rule.monitor_tool_id)
        .bind(&rule.event_title)
        .bind(i64::from(rule.parent_child_lookup_required))
        .bind(i64::from(rule.wait_time_in_seconds))
        .bind(i64::from(rule.up_event_flag))
        .bind(i64::from(rule.do_not_create_ticket_flag))
        .bind(rule.itsm_assignment_group_uid)
        .bind(rule.itsm_severity.map(i64::from))
        .bind(&rule.itsm_title)
        .bind(&rule.itsm_desc)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row: CorrelationRuleRow = sqlx::query_as(
            "SELECT * FROM correlation_rules WHERE monitor_tool_id = ? AND event_title = ?",
        )
        .bind(rule.monitor_tool_id)
        .bind(&rule.event_title)
        .fetch_one(&self.pool)
        .await?;
        CorrelationRule::try_from(row)
    }
}
