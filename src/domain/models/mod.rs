//! Domain models.

pub mod config;
pub mod correlation_rule;
pub mod error_log;
pub mod event;
pub mod event_record;
pub mod ingress_log;
pub mod monitor_tool;
pub mod pipeline_rule;

pub use config::Config;
pub use correlation_rule::{CorrelationRule, EffectiveRule, LevelSubRule, WILDCARD_EVENT_TITLE};
pub use error_log::{ErrorLog, ERROR_REPEAT_THRESHOLD};
pub use event::{
    event_id_for, event_index_for, event_index_is_older_than, EventDoc, EventStatus, EventType,
    ResolvingAction, ACTIVE_EVENT_STATUS, COMPLETE_EVENT_STATUS, EVENT_INDEX_PATTERN,
    EVENT_INDEX_PREFIX, NON_COMPLETE_EVENT_STATUS,
};
pub use event_record::{EventExtras, EventRecord, NewEventRecord};
pub use ingress_log::{IngressLog, IngressMethod, IngressStatus, IngressTask, NewIngressLog};
pub use monitor_tool::{
    default_tool_pipeline, tool_name_identifier, MonitorTool, MonitorToolIp, DEFAULT_TOOL_NAME,
    TOOL_PIPELINE_SUFFIX,
};
pub use pipeline_rule::{PipelineRule, PipelineRuleType, ProcessorSpec};
