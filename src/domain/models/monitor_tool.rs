//! Monitor tool and source-IP mapping models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the tool assumed when a source IP is not mapped to any tool.
pub const DEFAULT_TOOL_NAME: &str = "Default Tool";

/// Suffix appended to a tool's name identifier to form its pipeline name.
pub const TOOL_PIPELINE_SUFFIX: &str = "-event-pipeline";

/// A monitoring system that sends events to the correlator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorTool {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl MonitorTool {
    /// Lowercased, hyphenated form of the tool name.
    pub fn name_identifier(&self) -> String {
        tool_name_identifier(&self.name)
    }

    /// Ingest pipeline dedicated to this tool.
    pub fn pipeline_name(&self) -> String {
        format!("{}{TOOL_PIPELINE_SUFFIX}", self.name_identifier())
    }
}

pub fn tool_name_identifier(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

/// Pipeline used for events whose tool defines no rules or is unknown.
pub fn default_tool_pipeline() -> String {
    format!("{}{TOOL_PIPELINE_SUFFIX}", tool_name_identifier(DEFAULT_TOOL_NAME))
}

/// A source IP mapped (or not yet mapped) to a monitor tool.
///
/// Unknown IPs auto-register unmapped on first contact so an operator can
/// assign them later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorToolIp {
    pub ip: String,
    pub monitor_tool_id: Option<i64>,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Display for MonitorTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_name_derivation() {
        let tool = MonitorTool {
            id: 1,
            name: "Net Watcher".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(tool.name_identifier(), "net-watcher");
        assert_eq!(tool.pipeline_name(), "net-watcher-event-pipeline");
        assert_eq!(default_tool_pipeline(), "default-tool-event-pipeline");
    }
}
