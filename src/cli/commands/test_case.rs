//! Scripted test cases: replay a fixture event sequence over HTTP against a
//! running instance and let the correlator do its thing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::domain::models::correlation_rule::NewCorrelationRule;
use crate::domain::models::event::field;
use crate::domain::models::{default_tool_pipeline, Config};
use crate::domain::ports::RuleRepository;
use crate::services::PipelineManager;

const ASSET_MAPPING_FILE: &str = "TEST_CASE_ASSET_MAPPING.json";
const EVENTS_FILE: &str = "TEST_CASE_EVENTS.json";

/// One scripted event: asset, title, type, level, description, seconds to
/// wait afterwards, and an optional message to print.
#[derive(Debug)]
struct ScriptedEvent {
    asset: String,
    title: String,
    event_type: String,
    level: String,
    desc: String,
    wait_secs: i64,
    message: Option<String>,
}

impl ScriptedEvent {
    fn parse(step: &Value) -> Result<Self> {
        let entry = step.as_array().context("test case event must be an array")?;
        let text = |i: usize| -> String {
            entry.get(i).and_then(Value::as_str).unwrap_or_default().to_string()
        };
        Ok(Self {
            asset: text(0),
            title: text(1),
            event_type: text(2),
            level: text(3),
            desc: text(4),
            wait_secs: entry.get(5).and_then(Value::as_i64).unwrap_or(0),
            message: entry.get(6).and_then(Value::as_str).map(str::to_string),
        })
    }
}

pub async fn run(
    config: &Config,
    rules: Arc<dyn RuleRepository>,
    pipelines: &PipelineManager,
    case: &str,
    setup: bool,
    data_dir: &Path,
) -> Result<()> {
    if config.environment != "dev" {
        bail!("cannot execute test cases in environment {} [!= dev]", config.environment);
    }
    info!(environment = %config.environment, "running test case");

    if setup {
        run_setup(rules, pipelines, data_dir).await?;
    } else {
        info!("make sure setup was done before executing any test case");
    }

    let case = case.to_uppercase();
    let events_path = data_dir.join(EVENTS_FILE);
    let raw = std::fs::read_to_string(&events_path)
        .with_context(|| format!("failed to read {}", events_path.display()))?;
    let cases: serde_json::Map<String, Value> =
        serde_json::from_str(&raw).context("events file must be a map of test cases")?;
    let Some(Value::Array(steps)) = cases.get(&case) else {
        bail!("invalid test case {case}");
    };
    let Some(description) = steps.first().and_then(Value::as_str) else {
        bail!("test case {case} is missing its description entry");
    };

    let base_url = format!("http://{}", config.http.bind.replace("0.0.0.0", "127.0.0.1"));
    let client = reqwest::Client::new();

    println!("Test Case {case} - Starting");
    println!("{description}");
    println!("{}", "-".repeat(30));

    for step in &steps[1..] {
        let event = ScriptedEvent::parse(step)?;
        let data = json!({
            field::ASSET_UNIQUE_ID: event.asset,
            field::EVENT_TITLE: event.title,
            field::EVENT_TYPE: event.event_type,
            field::EVENT_LEVEL: event.level,
            field::EVENT_DESC: event.desc,
        });

        println!("Logging Event: {data}");
        let response = client
            .post(format!("{base_url}/event/"))
            .json(&data)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .context("failed to reach the running instance")?;
        if response.status().as_u16() != 202 {
            bail!("failed to log event {data} [{}]", response.status());
        }

        let wait = event.wait_secs.unsigned_abs();
        if wait > 0 {
            println!("Waiting for {wait} seconds");
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
        if let Some(message) = &event.message {
            println!("{message}");
        }
    }

    println!("{}", "-".repeat(30));
    println!("{description}");
    println!("Test Case {case} - Complete");
    Ok(())
}

async fn run_setup(
    rules: Arc<dyn RuleRepository>,
    pipelines: &PipelineManager,
    data_dir: &Path,
) -> Result<()> {
    info!("starting test case setup");

    let mapping_path = data_dir.join(ASSET_MAPPING_FILE);
    let raw = std::fs::read_to_string(&mapping_path)
        .with_context(|| format!("failed to read {}", mapping_path.display()))?;
    let assets: Value = serde_json::from_str(&raw)?;
    pipelines.load_asset_mapping(&assets, true).await?;
    pipelines.update_pipelines().await?;

    // Events are posted from localhost; when that IP is mapped to a tool
    // with its own pipeline, give the tool a test rule so correlation works
    // the same way.
    if let Some(tool) = rules.tool_for_ip("127.0.0.1").await? {
        if tool.pipeline_name() != default_tool_pipeline() {
            warn!(
                tool = %tool.name,
                pipeline = %tool.pipeline_name(),
                "127.0.0.1 is mapped to a tool with its own pipeline; \
                 test cases assume the default extraction"
            );
        }
        rules
            .upsert_rule(&NewCorrelationRule::with_defaults(tool.id, "TESTCASE"))
            .await?;
    }

    info!("completed test case setup");
    Ok(())
}
