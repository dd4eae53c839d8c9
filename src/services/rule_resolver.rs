//! Correlation rule resolution.
//!
//! The single place that turns (source IP, event title, event level) into
//! the rule that governs an event: exact (tool, title) first, then the
//! tool's `*` wildcard, then the built-in defaults. Handlers never query
//! the rule tables directly.

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EffectiveRule, EventRecord, WILDCARD_EVENT_TITLE};
use crate::domain::ports::RuleRepository;

#[derive(Clone)]
pub struct RuleResolver {
    repo: Arc<dyn RuleRepository>,
}

impl RuleResolver {
    pub fn new(repo: Arc<dyn RuleRepository>) -> Self {
        Self { repo }
    }

    /// The rule governing `record`, with level sub-rule overlay applied.
    pub async fn effective_for(&self, record: &EventRecord) -> DomainResult<EffectiveRule> {
        let Some(ip) = record.monitor_tool_ip.as_deref() else {
            return Ok(EffectiveRule::default());
        };
        let Some(tool) = self.repo.tool_for_ip(ip).await? else {
            return Ok(EffectiveRule::default());
        };

        let exact = match record.title.as_deref() {
            Some(title) => self.repo.rule_for(tool.id, title).await?,
            None => None,
        };
        let rule = match exact {
            Some(rule) => Some(rule),
            None => self.repo.rule_for(tool.id, WILDCARD_EVENT_TITLE).await?,
        };
        let Some(rule) = rule else {
            return Ok(EffectiveRule::default());
        };

        let level_rule = match record.level.as_deref() {
            Some(level) => self.repo.level_sub_rule(rule.id, level).await?,
            None => None,
        };

        Ok(EffectiveRule::from_rule(&rule, level_rule.as_ref()))
    }
}
