//! Ingest-pipeline reconciliation and asset topology loading.
//!
//! Configuration-time only. The pipeline rules of every monitor tool
//! compile into a per-tool ingest pipeline; the main pipeline dispatches to
//! them by tool name, enriches events with the asset topology, seeds the
//! process-maintained fields, and flags events missing required fields.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::event::field;
use crate::domain::models::{
    config::StoreConfig, default_tool_pipeline, EventStatus, EventType, PipelineRule,
    ProcessorSpec, DEFAULT_TOOL_NAME, EVENT_INDEX_PATTERN,
};
use crate::domain::ports::{EventStore, RuleRepository, StoreResult};

/// Bump when the enrich policy definition changes.
const ENRICH_POLICY_VERSION: u32 = 0;

/// Bump when the index template definition changes.
const INDEX_TEMPLATE_VERSION: u32 = 1;

const INDEX_TEMPLATE_NAME: &str = "conflux-events";

pub struct PipelineManager {
    store: Arc<dyn EventStore>,
    rules: Arc<dyn RuleRepository>,
    config: StoreConfig,
}

impl PipelineManager {
    pub fn new(
        store: Arc<dyn EventStore>,
        rules: Arc<dyn RuleRepository>,
        config: StoreConfig,
    ) -> Self {
        Self { store, rules, config }
    }

    /// Reconcile enrich policies, per-tool pipelines, the main pipeline and
    /// the index template with the configuration tables.
    pub async fn update_pipelines(&self) -> DomainResult<()> {
        info!("started pipeline reconciliation");

        self.create_enrich_policy().await.map_err(store_err)?;

        let tools = self.rules.list_tools().await?;
        let mut create_default_tool_pipeline = true;
        for tool in &tools {
            let rules = self.rules.pipeline_rules_for(tool.id).await?;
            if tool.pipeline_name() == default_tool_pipeline() {
                create_default_tool_pipeline = false;
                if rules.is_empty() {
                    self.put_default_tool_pipeline().await.map_err(store_err)?;
                    continue;
                }
            }
            self.store
                .put_ingest_pipeline(&tool.pipeline_name(), &tool_pipeline_processors(&rules))
                .await
                .map_err(store_err)?;
            info!(pipeline = %tool.pipeline_name(), "created/updated tool pipeline");
        }
        if create_default_tool_pipeline {
            self.put_default_tool_pipeline().await.map_err(store_err)?;
        }

        let tool_pipelines: Vec<(String, String)> = tools
            .iter()
            .map(|tool| (tool.name.clone(), tool.pipeline_name()))
            .collect();
        let processors =
            main_pipeline_processors(&tool_pipelines, &self.versioned_policy_name());
        self.store
            .put_ingest_pipeline(&self.config.main_pipeline, &processors)
            .await
            .map_err(store_err)?;
        info!(pipeline = %self.config.main_pipeline, "created/updated main pipeline");

        self.delete_old_enrich_policies().await.map_err(store_err)?;
        self.update_index_template().await?;

        info!("completed pipeline reconciliation");
        Ok(())
    }

    pub async fn update_index_template(&self) -> DomainResult<()> {
        let template = json!({
            "settings": {
                "index": {
                    "number_of_replicas": self.config.index_replicas,
                    "mapping": { "total_fields": { "limit": self.config.total_fields_limit } },
                }
            }
        });
        self.store
            .put_index_template(
                INDEX_TEMPLATE_NAME,
                EVENT_INDEX_PATTERN,
                INDEX_TEMPLATE_VERSION,
                &template,
            )
            .await
            .map_err(store_err)?;
        info!(version = INDEX_TEMPLATE_VERSION, "updated events index template");
        Ok(())
    }

    /// Bulk-load the asset topology; ids are upper-cased so lookups can be
    /// case-insensitive, and a `-` parent means none.
    pub async fn load_asset_mapping(
        &self,
        assets: &Value,
        exec_enrich_policy: bool,
    ) -> DomainResult<usize> {
        let entries: Vec<AssetMappingEntry> = serde_json::from_value(assets.clone())?;
        let last_update_ts = chrono::Utc::now().to_rfc3339();

        for entry in &entries {
            let asset_id = entry.asset_unique_id.trim();
            let doc = json!({
                field::ASSET_UNIQUE_ID: asset_id.to_uppercase(),
                field::ASSET_TYPE: entry.asset_type.trim().to_lowercase(),
                field::ASSET_REGION: entry.asset_region.trim().to_lowercase(),
                field::PARENT_ASSET_UNIQUE_ID: normalize(&entry.parent_asset_unique_id, str::to_uppercase),
                field::PARENT_ASSET_TYPE: normalize(&entry.parent_asset_type, str::to_lowercase),
                field::LAST_UPDATE_TS: last_update_ts,
            });
            let doc_id = format!(
                "{}.{}.{asset_id}",
                doc[field::ASSET_REGION].as_str().unwrap_or_default(),
                doc[field::ASSET_TYPE].as_str().unwrap_or_default(),
            );
            self.store
                .index(&self.config.asset_mapping_index, &doc_id, None, &doc, false)
                .await
                .map_err(store_err)?;
        }
        info!(count = entries.len(), "loaded asset mapping documents");

        if exec_enrich_policy {
            self.store
                .execute_enrich_policy(&self.versioned_policy_name())
                .await
                .map_err(store_err)?;
            info!(policy = %self.versioned_policy_name(), "executed enrich policy");
        }
        Ok(entries.len())
    }

    fn versioned_policy_name(&self) -> String {
        format!("{}_v{ENRICH_POLICY_VERSION}", self.config.asset_mapping_policy)
    }

    async fn create_enrich_policy(&self) -> StoreResult<()> {
        let name = self.versioned_policy_name();
        if self.store.enrich_policy_exists(&name).await? {
            return Ok(());
        }
        let match_def = json!({
            "indices": self.config.asset_mapping_index,
            "match_field": field::ASSET_UNIQUE_ID,
            "enrich_fields": [
                field::ASSET_UNIQUE_ID,
                field::ASSET_TYPE,
                field::ASSET_REGION,
                field::PARENT_ASSET_UNIQUE_ID,
                field::PARENT_ASSET_TYPE,
            ],
        });
        self.store.put_enrich_policy(&name, &match_def).await?;
        info!(policy = %name, "created enrich policy");
        self.store.execute_enrich_policy(&name).await
    }

    async fn delete_old_enrich_policies(&self) -> StoreResult<()> {
        for version in 0..ENRICH_POLICY_VERSION {
            let name = format!("{}_v{version}", self.config.asset_mapping_policy);
            if self.store.enrich_policy_exists(&name).await? {
                self.store.delete_enrich_policy(&name).await?;
                info!(policy = %name, "deleted superseded enrich policy");
            }
        }
        Ok(())
    }

    async fn put_default_tool_pipeline(&self) -> StoreResult<()> {
        self.store
            .put_ingest_pipeline(&default_tool_pipeline(), &default_tool_pipeline_processors())
            .await?;
        info!(pipeline = %default_tool_pipeline(), "created/updated default tool pipeline");
        Ok(())
    }
}

fn store_err(e: crate::domain::ports::StoreError) -> DomainError {
    DomainError::StoreError(e.to_string())
}

fn normalize(value: &Option<String>, case: impl Fn(&str) -> String) -> Option<String> {
    let trimmed = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
    if trimmed == "-" {
        return None;
    }
    Some(case(trimmed))
}

#[derive(Debug, Deserialize)]
struct AssetMappingEntry {
    asset_unique_id: String,
    asset_type: String,
    asset_region: String,
    #[serde(default)]
    parent_asset_unique_id: Option<String>,
    #[serde(default)]
    parent_asset_type: Option<String>,
}

/// Processor that extracts `event_type` from the default payload location,
/// falling back to the missing marker.
fn fallback_event_type_processor() -> Value {
    lowercase_event_type_processor(
        &format!("{}.{}", field::EVENT_DETAILS, field::EVENT_TYPE),
        &format!("set-{}", field::EVENT_TYPE),
    )
}

fn lowercase_event_type_processor(from: &str, tag: &str) -> Value {
    json!({
        "lowercase": {
            "field": from,
            "target_field": field::EVENT_TYPE,
            "tag": format!("{tag}-lowercase"),
            "on_failure": [{
                "set": {
                    "field": field::EVENT_TYPE,
                    "value": EventType::MISSING_WIRE_VALUE,
                    "tag": format!("{tag}-{}", EventType::MISSING_WIRE_VALUE),
                }
            }],
        }
    })
}

/// Compile a tool's ordered extraction rules into its pipeline.
pub fn tool_pipeline_processors(rules: &[PipelineRule]) -> Vec<Value> {
    let mut processors = Vec::new();
    let mut add_fallback_event_type = true;

    for rule in rules {
        match rule.processor_spec() {
            Some(ProcessorSpec::Processor(processor)) => processors.push(processor),
            Some(ProcessorSpec::EventTypeDefault { value, tag }) => {
                add_fallback_event_type = false;
                processors.push(json!({
                    "set": { "field": field::EVENT_TYPE, "value": value, "tag": tag }
                }));
            }
            Some(ProcessorSpec::EventTypeFrom { from, up, down, neutral, tag }) => {
                add_fallback_event_type = false;
                processors.push(lowercase_event_type_processor(&from, &tag));
                let typed_values = [
                    (EventType::Down, down),
                    (EventType::Up, up),
                    (EventType::Neutral, neutral),
                ];
                for (event_type, values) in typed_values {
                    if values.is_empty() {
                        continue;
                    }
                    let condition = values
                        .iter()
                        .map(|v| format!("ctx['{}'] == '{}'", field::EVENT_TYPE, v.to_lowercase()))
                        .collect::<Vec<_>>()
                        .join(" || ");
                    processors.push(json!({
                        "set": {
                            "field": field::EVENT_TYPE,
                            "value": event_type.as_str(),
                            "if": condition,
                            "tag": format!("{tag}-{event_type}"),
                        }
                    }));
                }
            }
            None => {}
        }
    }

    if add_fallback_event_type {
        processors.push(fallback_event_type_processor());
    }
    processors
}

/// Pipeline for tools without their own rules: copy the conventional
/// payload fields out of `event_details`.
pub fn default_tool_pipeline_processors() -> Vec<Value> {
    let copy_fields = [
        field::ASSET_UNIQUE_ID,
        field::EVENT_DESC,
        field::EVENT_LEVEL,
        field::EVENT_TITLE,
        field::EVENT_TS,
    ];

    let mut processors = vec![json!({
        "set": {
            "field": field::TOOL_NAME,
            "value": DEFAULT_TOOL_NAME,
            "if": format!("ctx['{}'] == null", field::TOOL_NAME),
            "tag": format!("set-{}", field::TOOL_NAME),
        }
    })];

    for copy_field in copy_fields {
        processors.push(json!({
            "set": {
                "field": copy_field,
                "copy_from": format!("{}.{copy_field}", field::EVENT_DETAILS),
                "ignore_empty_value": true,
                "if": format!("ctx['{}'].containsKey('{copy_field}')", field::EVENT_DETAILS),
                "tag": format!("set-{copy_field}"),
            }
        }));
    }

    processors.push(fallback_event_type_processor());
    processors
}

/// The main event pipeline: tool dispatch, asset enrichment, seeded
/// process fields, required-field checks.
pub fn main_pipeline_processors(
    tool_pipelines: &[(String, String)],
    enrich_policy: &str,
) -> Vec<Value> {
    let mut processors: Vec<Value> = tool_pipelines
        .iter()
        .map(|(tool_name, pipeline_name)| {
            json!({
                "pipeline": {
                    "name": pipeline_name,
                    "if": format!("ctx.{} == '{tool_name}'", field::TOOL_NAME),
                    "tag": format!("pipeline-{pipeline_name}"),
                }
            })
        })
        .collect();

    processors.push(json!({
        "pipeline": {
            "name": default_tool_pipeline(),
            "if": format!("ctx['{}'] == null", field::TOOL_NAME),
            "tag": format!("pipeline-{}", default_tool_pipeline()),
        }
    }));

    // Asset topology enrichment into a scratch field, copied out and removed.
    processors.push(json!({
        "enrich": {
            "field": field::ASSET_UNIQUE_ID,
            "policy_name": enrich_policy,
            "target_field": "asset",
            "if": format!(
                "ctx.containsKey('{0}') && ctx['{0}'] != null",
                field::ASSET_UNIQUE_ID
            ),
            "tag": "enrich-asset",
        }
    }));
    for (asset_field, override_flag) in [
        (field::ASSET_TYPE, false),
        (field::ASSET_REGION, false),
        (field::PARENT_ASSET_UNIQUE_ID, true),
        (field::PARENT_ASSET_TYPE, true),
    ] {
        let mut processor = json!({
            "set": {
                "field": asset_field,
                "copy_from": format!("asset.{asset_field}"),
                "if": "ctx.containsKey('asset')",
                "tag": format!("set-{asset_field}-from-asset"),
            }
        });
        if !override_flag {
            processor["set"]["override"] = json!(false);
            processor["set"]["ignore_empty_value"] = json!(true);
        }
        processors.push(processor);
    }
    processors.push(json!({
        "remove": { "field": "asset", "ignore_missing": true, "tag": "remove-asset" }
    }));

    // Seed the process-maintained fields.
    processors.push(json!({
        "set": {
            "field": field::INITIAL_EVENT,
            "copy_from": "_id",
            "tag": format!("set-{}-from-id", field::INITIAL_EVENT),
        }
    }));
    processors.push(json!({
        "set": {
            "field": field::INITIAL_EVENT_INDEX,
            "copy_from": "_index",
            "tag": format!("set-{}-from-index", field::INITIAL_EVENT_INDEX),
        }
    }));
    processors.push(json!({
        "set": {
            "field": field::EVENT_TYPE,
            "value": EventType::MISSING_WIRE_VALUE,
            "if": format!("!ctx.containsKey('{}')", field::EVENT_TYPE),
            "tag": format!("set-{}-as-{}", field::EVENT_TYPE, EventType::MISSING_WIRE_VALUE),
        }
    }));
    processors.push(json!({
        "set": {
            "field": field::EVENT_STATUS,
            "value": EventStatus::New.as_str(),
            "tag": format!("set-{}-as-{}", field::EVENT_STATUS, EventStatus::New),
        }
    }));

    // Required fields: asset id, title, and a recognizable event type.
    processors.push(json!({
        "append": {
            "field": field::ERROR_REASON,
            "value": format!("{} is missing.", field::ASSET_UNIQUE_ID),
            "if": format!(
                "!ctx.containsKey('{0}') || ctx['{0}'] == null",
                field::ASSET_UNIQUE_ID
            ),
            "tag": format!("append-{}-{}", field::ERROR_REASON, field::ASSET_UNIQUE_ID),
        }
    }));
    processors.push(json!({
        "append": {
            "field": field::ERROR_REASON,
            "value": format!("{} is missing.", field::EVENT_TITLE),
            "if": format!(
                "!ctx.containsKey('{0}') || ctx['{0}'] == null",
                field::EVENT_TITLE
            ),
            "tag": format!("append-{}-{}", field::ERROR_REASON, field::EVENT_TITLE),
        }
    }));
    processors.push(json!({
        "append": {
            "field": field::ERROR_REASON,
            "value": format!("{} is missing/invalid.", field::EVENT_TYPE),
            "if": format!(
                "ctx['{0}'] != '{1}' && ctx['{0}'] != '{2}' && ctx['{0}'] != '{3}'",
                field::EVENT_TYPE,
                EventType::Down,
                EventType::Up,
                EventType::Neutral,
            ),
            "tag": format!("append-{}-{}", field::ERROR_REASON, field::EVENT_TYPE),
        }
    }));
    processors.push(json!({
        "join": {
            "field": field::ERROR_REASON,
            "separator": " ",
            "if": format!("ctx.containsKey('{}')", field::ERROR_REASON),
            "tag": format!("join-{}", field::ERROR_REASON),
        }
    }));
    processors.push(json!({
        "set": {
            "field": field::EVENT_STATUS,
            "value": EventStatus::Error.as_str(),
            "if": format!("ctx.containsKey('{}')", field::ERROR_REASON),
            "tag": format!("set-{}-as-{}", field::EVENT_STATUS, EventStatus::Error),
        }
    }));

    processors.push(json!({
        "set": {
            "field": field::EVENT_TS,
            "copy_from": field::RECEIVED_TS,
            "if": format!("!ctx.containsKey('{}')", field::EVENT_TS),
            "tag": format!("set-{}-using-{}", field::EVENT_TS, field::RECEIVED_TS),
        }
    }));
    processors.push(json!({
        "set": { "field": field::LAST_UPDATE_TS, "copy_from": "_ingest.timestamp" }
    }));

    processors
}
