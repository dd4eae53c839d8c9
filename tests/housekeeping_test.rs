//! Purge jobs and pipeline reconciliation against the in-memory store.

mod helpers;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use conflux::domain::models::config::{RetentionConfig, StoreConfig};
use conflux::domain::models::event_index_for;
use conflux::domain::ports::RuleRepository;
use conflux::services::{PipelineManager, PurgeService};

use helpers::TestHarness;

#[tokio::test]
async fn aged_indices_without_open_events_are_dropped() {
    let h = TestHarness::new().await;

    // Old index, all terminal: eligible.
    h.store.put_doc("events-20200101", "a", json!({ "status": "resolved" }));
    h.store.put_doc("events-20200101", "b", json!({ "status": "deduped" }));
    // Old index with an open event: kept.
    h.store.put_doc("events-20200202", "c", json!({ "status": "alerted" }));
    // Current index: kept regardless of status.
    let current_index = event_index_for(Utc::now());
    h.store.put_doc(&current_index, "d", json!({ "status": "resolved" }));

    let purge = PurgeService::new(
        h.records.clone(),
        h.ingress.clone(),
        h.store.clone(),
        RetentionConfig::default(),
    );
    let dropped = purge.purge_event_indices().await.unwrap();

    assert_eq!(dropped, 1);
    assert!(h.store.doc_source("events-20200101", "a").is_none());
    assert!(h.store.doc_source("events-20200202", "c").is_some());
    assert!(h.store.doc_source(&current_index, "d").is_some());
}

#[tokio::test]
async fn update_pipelines_materializes_tool_main_and_template() {
    let h = TestHarness::new().await;
    let tool = h.rules.upsert_tool("Net Watcher").await.unwrap();
    // A tool without pipeline rules still gets its (fallback-only) pipeline.
    assert_eq!(tool.pipeline_name(), "net-watcher-event-pipeline");

    let manager = PipelineManager::new(
        h.store.clone(),
        h.rules.clone(),
        StoreConfig::default(),
    );
    manager.update_pipelines().await.unwrap();

    let tool_pipeline = h.store.pipeline("net-watcher-event-pipeline").expect("tool pipeline");
    assert_eq!(tool_pipeline.len(), 1);

    let default_pipeline = h
        .store
        .pipeline("default-tool-event-pipeline")
        .expect("default tool pipeline");
    assert!(default_pipeline.len() > 1);

    let main_pipeline = h.store.pipeline("event-pipeline").expect("main pipeline");
    assert_eq!(main_pipeline[0]["pipeline"]["name"], "net-watcher-event-pipeline");

    let template = h.store.template("conflux-events").expect("index template");
    assert_eq!(template["index_patterns"][0], "events-*");
}

#[tokio::test]
async fn asset_mapping_load_normalizes_documents() {
    let h = TestHarness::new().await;
    let manager = PipelineManager::new(
        Arc::clone(&h.store) as Arc<dyn conflux::domain::ports::EventStore>,
        h.rules.clone(),
        StoreConfig::default(),
    );

    let assets = json!([
        {
            "asset_unique_id": "srv-app-01",
            "asset_type": "Server",
            "asset_region": "EMEA",
            "parent_asset_unique_id": "core-sw-01",
            "parent_asset_type": "Switch",
        },
        {
            "asset_unique_id": "core-sw-01",
            "asset_type": "Switch",
            "asset_region": "EMEA",
            "parent_asset_unique_id": "-",
            "parent_asset_type": "-",
        },
    ]);
    let loaded = manager.load_asset_mapping(&assets, false).await.unwrap();
    assert_eq!(loaded, 2);

    let child = h
        .store
        .doc_source("conflux-asset-mapping", "emea.server.srv-app-01")
        .expect("child doc");
    assert_eq!(child["asset_unique_id"], "SRV-APP-01");
    assert_eq!(child["parent_asset_unique_id"], "CORE-SW-01");
    assert_eq!(child["parent_asset_type"], "switch");

    let root = h
        .store
        .doc_source("conflux-asset-mapping", "emea.switch.core-sw-01")
        .expect("root doc");
    assert_eq!(root["parent_asset_unique_id"], serde_json::Value::Null);
}
