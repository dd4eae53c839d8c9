//! Per-tool extraction rule model.
//!
//! These rules are declarative: at configuration time they compile into the
//! document store's ingest pipeline processors, and are never consulted
//! while an event is being correlated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::event::field;

/// Kind of extraction a pipeline rule performs.
///
/// Each tool pipeline should carry one `asset_id` and one `event_type` rule;
/// the other kinds may appear any number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRuleType {
    AssetId,
    EventType,
    Set,
    Grok,
    Remove,
}

impl PipelineRuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssetId => "asset_id",
            Self::EventType => "event_type",
            Self::Set => "set",
            Self::Grok => "grok",
            Self::Remove => "remove",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "asset_id" => Some(Self::AssetId),
            "event_type" => Some(Self::EventType),
            "set" => Some(Self::Set),
            "grok" => Some(Self::Grok),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRule {
    pub id: i64,
    pub monitor_tool_id: i64,
    /// Execution order; rules with equal order must be independent.
    pub order_no: u16,
    pub rule_type: PipelineRuleType,

    // event_type rules
    pub event_type_default: Option<String>,
    pub event_type_field: Option<String>,
    pub event_type_up_values: Option<String>,
    pub event_type_down_values: Option<String>,
    pub event_type_neutral_values: Option<String>,

    // set / asset_id rules
    pub set_field: Option<String>,
    pub set_value: Option<String>,
    pub set_copy_from_flag: bool,
    pub override_flag: bool,
    pub ignore_empty_value_flag: bool,

    // grok rules
    pub grok_field: Option<String>,
    pub grok_patterns: Option<Value>,
    pub grok_pattern_definitions: Option<Value>,

    // remove rules
    pub remove_field: Option<String>,

    pub ignore_missing_flag: bool,
    pub if_condition: Option<String>,
    pub ignore_failure_flag: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A pipeline rule compiled into processor terms the pipeline builder
/// assembles into the tool's ingest pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorSpec {
    /// A complete `set` / `grok` / `remove` processor body.
    Processor(Value),
    /// Fixed event type for every event of the tool.
    EventTypeDefault { value: String, tag: String },
    /// Event type copied from a payload field and matched against
    /// per-type value lists.
    EventTypeFrom {
        from: String,
        up: Vec<String>,
        down: Vec<String>,
        neutral: Vec<String>,
        tag: String,
    },
}

impl PipelineRule {
    fn tag(&self, target_field: &str) -> String {
        format!("{}-{}-{}", self.order_no, self.rule_type.as_str(), target_field)
    }

    fn condition(&self) -> Option<String> {
        self.if_condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// Compile this rule into processor terms. Returns `None` for rule rows
    /// whose mandatory fields are missing.
    pub fn processor_spec(&self) -> Option<ProcessorSpec> {
        match self.rule_type {
            PipelineRuleType::EventType => {
                if let Some(value) = &self.event_type_default {
                    return Some(ProcessorSpec::EventTypeDefault {
                        value: value.clone(),
                        tag: self.tag(field::EVENT_TYPE),
                    });
                }
                let from = self.event_type_field.clone()?;
                let split = |v: &Option<String>| -> Vec<String> {
                    v.as_deref()
                        .map(|s| s.split(',').map(|p| p.to_string()).collect())
                        .unwrap_or_default()
                };
                Some(ProcessorSpec::EventTypeFrom {
                    from,
                    up: split(&self.event_type_up_values),
                    down: split(&self.event_type_down_values),
                    neutral: split(&self.event_type_neutral_values),
                    tag: self.tag(field::EVENT_TYPE),
                })
            }
            PipelineRuleType::Set | PipelineRuleType::AssetId => {
                let target = if self.rule_type == PipelineRuleType::Set {
                    self.set_field.clone()?
                } else {
                    field::ASSET_UNIQUE_ID.to_string()
                };
                let mut body = json!({
                    "field": target,
                    "override": self.override_flag,
                    "ignore_empty_value": self.ignore_empty_value_flag,
                    "ignore_failure": self.ignore_failure_flag,
                    "tag": self.tag(&target),
                });
                if self.set_copy_from_flag {
                    body["copy_from"] = json!(self.set_value);
                } else {
                    body["value"] = json!(self.set_value);
                }
                if let Some(cond) = self.condition() {
                    body["if"] = json!(cond);
                }
                Some(ProcessorSpec::Processor(json!({ "set": body })))
            }
            PipelineRuleType::Grok => {
                let grok_field = self.grok_field.clone()?;
                let mut body = json!({
                    "field": grok_field,
                    "patterns": self.grok_patterns,
                    "pattern_definitions": self.grok_pattern_definitions,
                    "ignore_missing": self.ignore_missing_flag,
                    "ignore_failure": self.ignore_failure_flag,
                    "tag": self.tag(&grok_field),
                });
                if let Some(cond) = self.condition() {
                    body["if"] = json!(cond);
                }
                Some(ProcessorSpec::Processor(json!({ "grok": body })))
            }
            PipelineRuleType::Remove => {
                let remove_field = self.remove_field.clone()?;
                let mut body = json!({
                    "field": remove_field,
                    "ignore_missing": self.ignore_missing_flag,
                    "ignore_failure": self.ignore_failure_flag,
                    "tag": self.tag(&remove_field),
                });
                if let Some(cond) = self.condition() {
                    body["if"] = json!(cond);
                }
                Some(ProcessorSpec::Processor(json!({ "remove": body })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_rule(rule_type: PipelineRuleType) -> PipelineRule {
        PipelineRule {
            id: 1,
            monitor_tool_id: 1,
            order_no: 2,
            rule_type,
            event_type_default: None,
            event_type_field: None,
            event_type_up_values: None,
            event_type_down_values: None,
            event_type_neutral_values: None,
            set_field: None,
            set_value: None,
            set_copy_from_flag: false,
            override_flag: true,
            ignore_empty_value_flag: false,
            grok_field: None,
            grok_patterns: None,
            grok_pattern_definitions: None,
            remove_field: None,
            ignore_missing_flag: false,
            if_condition: None,
            ignore_failure_flag: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn asset_id_rule_targets_the_asset_field() {
        let mut rule = base_rule(PipelineRuleType::AssetId);
        rule.set_value = Some("event_details.host".to_string());
        rule.set_copy_from_flag = true;

        let Some(ProcessorSpec::Processor(value)) = rule.processor_spec() else {
            panic!("expected a set processor");
        };
        assert_eq!(value["set"]["field"], "asset_unique_id");
        assert_eq!(value["set"]["copy_from"], "event_details.host");
        assert_eq!(value["set"]["tag"], "2-asset_id-asset_unique_id");
    }

    #[test]
    fn event_type_rule_splits_value_lists() {
        let mut rule = base_rule(PipelineRuleType::EventType);
        rule.event_type_field = Some("event_details.state".to_string());
        rule.event_type_down_values = Some("down,critical".to_string());
        rule.event_type_up_values = Some("ok".to_string());

        let Some(ProcessorSpec::EventTypeFrom { from, down, up, neutral, .. }) =
            rule.processor_spec()
        else {
            panic!("expected an event-type spec");
        };
        assert_eq!(from, "event_details.state");
        assert_eq!(down, vec!["down", "critical"]);
        assert_eq!(up, vec!["ok"]);
        assert!(neutral.is_empty());
    }

    #[test]
    fn incomplete_rule_compiles_to_nothing() {
        assert!(base_rule(PipelineRuleType::Grok).processor_spec().is_none());
    }
}
