//! In-memory document store implementing the EventStore port.
//!
//! Emulates the parts of the real store the correlator relies on: partial
//! updates, boolean term/range/exists queries, sorting, and the main ingest
//! pipeline's extraction, enrichment and required-field checks.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use conflux::domain::ports::event_store::{
    BulkUpdate, EventStore, SearchRequest, SearchResponse, SortOrder, StoreError, StoreResult,
    StoredDocument,
};

/// Asset topology entry for the emulated enrichment step.
#[derive(Debug, Clone, Default)]
pub struct AssetInfo {
    pub asset_type: Option<String>,
    pub asset_region: Option<String>,
    pub parent_asset_unique_id: Option<String>,
    pub parent_asset_type: Option<String>,
}

#[derive(Default)]
pub struct MemoryEventStore {
    docs: Mutex<BTreeMap<(String, String), Value>>,
    assets: Mutex<HashMap<String, AssetInfo>>,
    pipelines: Mutex<HashMap<String, Vec<Value>>>,
    templates: Mutex<HashMap<String, Value>>,
    policies: Mutex<HashSet<String>>,
    /// When set, every update call fails as transient.
    pub fail_updates: std::sync::atomic::AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset for the enrichment step; the id is matched
    /// case-insensitively like the real enrich lookup.
    pub fn add_asset(&self, asset_id: &str, info: AssetInfo) {
        self.assets
            .lock()
            .unwrap()
            .insert(asset_id.to_uppercase(), info);
    }

    pub fn doc_source(&self, index: &str, id: &str) -> Option<Value> {
        self.docs
            .lock()
            .unwrap()
            .get(&(index.to_string(), id.to_string()))
            .cloned()
    }

    pub fn put_doc(&self, index: &str, id: &str, source: Value) {
        self.docs
            .lock()
            .unwrap()
            .insert((index.to_string(), id.to_string()), source);
    }

    pub fn pipeline(&self, id: &str) -> Option<Vec<Value>> {
        self.pipelines.lock().unwrap().get(id).cloned()
    }

    pub fn template(&self, name: &str) -> Option<Value> {
        self.templates.lock().unwrap().get(name).cloned()
    }

    fn updates_failing(&self) -> bool {
        self.fail_updates.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// The main pipeline: default extraction out of `event_details`, asset
    /// enrichment, seeded process fields and required-field checks.
    fn apply_main_pipeline(&self, index: &str, id: &str, doc: &mut Value) {
        let details = doc["event_details"].clone();

        if doc.get("monitor_tool_name").map_or(true, Value::is_null) {
            doc["monitor_tool_name"] = json!("Default Tool");
        }
        for field in ["asset_unique_id", "event_desc", "event_level", "event_title", "event_ts"] {
            if doc.get(field).map_or(true, Value::is_null) {
                if let Some(value) = details.get(field).filter(|v| !v.is_null()) {
                    doc[field] = value.clone();
                }
            }
        }
        doc["event_type"] = match details.get("event_type").and_then(Value::as_str) {
            Some(raw) => json!(raw.to_lowercase()),
            None => json!("<<missing>>"),
        };

        if let Some(asset_id) = doc["asset_unique_id"].as_str() {
            if let Some(info) = self.assets.lock().unwrap().get(&asset_id.to_uppercase()) {
                if doc.get("asset_type").map_or(true, Value::is_null) {
                    doc["asset_type"] = json!(info.asset_type);
                }
                if doc.get("asset_region").map_or(true, Value::is_null) {
                    doc["asset_region"] = json!(info.asset_region);
                }
                doc["parent_asset_unique_id"] = json!(info.parent_asset_unique_id);
                doc["parent_asset_type"] = json!(info.parent_asset_type);
            }
        }

        doc["initial_event_id"] = json!(id);
        doc["initial_event_index"] = json!(index);
        doc["status"] = json!("new");

        let mut error_reasons = Vec::new();
        if doc.get("asset_unique_id").map_or(true, Value::is_null) {
            error_reasons.push("asset_unique_id is missing.");
        }
        if doc.get("event_title").map_or(true, Value::is_null) {
            error_reasons.push("event_title is missing.");
        }
        if !matches!(doc["event_type"].as_str(), Some("up" | "down" | "neutral")) {
            error_reasons.push("event_type is missing/invalid.");
        }
        if !error_reasons.is_empty() {
            doc["error_reason"] = json!(error_reasons.join(" "));
            doc["status"] = json!("error");
        }

        if doc.get("event_ts").map_or(true, Value::is_null) {
            doc["event_ts"] = doc["received_ts"].clone();
        }
        doc["last_update_ts"] = json!(Utc::now().to_rfc3339());
    }
}

fn index_matches(pattern: &str, index: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => index.starts_with(prefix),
        None => index == pattern,
    }
}

fn field_of(clause: &Value) -> Option<(&str, &Value)> {
    clause.as_object()?.iter().next().map(|(k, v)| (k.as_str(), v))
}

fn as_comparable(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn compare_ts(left: &str, right: &str) -> std::cmp::Ordering {
    match (DateTime::parse_from_rfc3339(left), DateTime::parse_from_rfc3339(right)) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.cmp(right),
    }
}

fn clause_matches(source: &Value, clause: &Value) -> bool {
    if let Some(term) = clause.get("term") {
        let Some((raw_field, expected)) = field_of(term) else { return false };
        let field = raw_field.strip_suffix(".keyword").unwrap_or(raw_field);
        let actual = source.get(field);
        let (expected_value, case_insensitive) = match expected {
            Value::Object(spec) => (
                spec.get("value").cloned().unwrap_or(Value::Null),
                spec.get("case_insensitive").and_then(Value::as_bool).unwrap_or(false),
            ),
            other => (other.clone(), false),
        };
        let (Some(actual), Some(expected)) =
            (actual.and_then(|v| as_comparable(v)), as_comparable(&expected_value))
        else {
            return false;
        };
        if case_insensitive {
            return actual.to_lowercase() == expected.to_lowercase();
        }
        return actual == expected;
    }

    if let Some(range) = clause.get("range") {
        let Some((field, bounds)) = field_of(range) else { return false };
        let Some(actual) = source.get(field).and_then(as_comparable) else { return false };
        if let Some(lte) = bounds.get("lte").and_then(Value::as_str) {
            return compare_ts(&actual, lte) != std::cmp::Ordering::Greater;
        }
        return false;
    }

    if let Some(exists) = clause.get("exists") {
        let Some(field) = exists.get("field").and_then(Value::as_str) else { return false };
        return source.get(field).is_some_and(|v| !v.is_null());
    }

    false
}

fn query_matches(source: &Value, query: &Value) -> bool {
    let bool_query = &query["bool"];

    if let Some(must) = bool_query.get("must").and_then(Value::as_array) {
        if !must.iter().all(|clause| clause_matches(source, clause)) {
            return false;
        }
    }
    if let Some(must_not) = bool_query.get("must_not").and_then(Value::as_array) {
        if must_not.iter().any(|clause| clause_matches(source, clause)) {
            return false;
        }
    }
    if let Some(should) = bool_query.get("should").and_then(Value::as_array) {
        let minimum = bool_query
            .get("minimum_should_match")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        if minimum > 0 {
            let matched = should
                .iter()
                .filter(|clause| clause_matches(source, clause))
                .count();
            if matched < minimum {
                return false;
            }
        }
    }
    true
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn get(&self, index: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        Ok(self.doc_source(index, id).map(|source| StoredDocument {
            index: index.to_string(),
            id: id.to_string(),
            source,
        }))
    }

    async fn index(
        &self,
        index: &str,
        id: &str,
        pipeline: Option<&str>,
        document: &Value,
        create: bool,
    ) -> StoreResult<()> {
        let key = (index.to_string(), id.to_string());
        if create && self.docs.lock().unwrap().contains_key(&key) {
            return Err(StoreError::Conflict(format!("document {id} already exists")));
        }
        let mut doc = document.clone();
        if pipeline.is_some() {
            self.apply_main_pipeline(index, id, &mut doc);
        }
        self.docs.lock().unwrap().insert(key, doc);
        Ok(())
    }

    async fn update(&self, index: &str, id: &str, doc: &Value) -> StoreResult<()> {
        if self.updates_failing() {
            return Err(StoreError::Transient("updates disabled".to_string()));
        }
        let mut docs = self.docs.lock().unwrap();
        let existing = docs
            .get_mut(&(index.to_string(), id.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                index: index.to_string(),
                id: id.to_string(),
            })?;
        if let (Value::Object(target), Value::Object(partial)) = (existing, doc) {
            for (key, value) in partial {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn bulk_update(&self, operations: &[BulkUpdate]) -> StoreResult<()> {
        for op in operations {
            self.update(&op.index, &op.id, &op.doc).await?;
        }
        Ok(())
    }

    async fn search(&self, request: SearchRequest) -> StoreResult<SearchResponse> {
        let query = request.query.clone().into_value();
        let docs = self.docs.lock().unwrap();
        let mut hits: Vec<StoredDocument> = docs
            .iter()
            .filter(|((index, _), source)| {
                index_matches(&request.index, index) && query_matches(source, &query)
            })
            .map(|((index, id), source)| StoredDocument {
                index: index.clone(),
                id: id.clone(),
                source: source.clone(),
            })
            .collect();

        if let Some((field, order)) = &request.sort {
            hits.sort_by(|a, b| {
                let left = a.source.get(field).and_then(as_comparable).unwrap_or_default();
                let right = b.source.get(field).and_then(as_comparable).unwrap_or_default();
                let ordering = compare_ts(&left, &right);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let total = hits.len() as u64;
        if let Some(size) = request.size {
            hits.truncate(size as usize);
        }
        Ok(SearchResponse { total, hits })
    }

    async fn put_ingest_pipeline(&self, id: &str, processors: &[Value]) -> StoreResult<()> {
        self.pipelines
            .lock()
            .unwrap()
            .insert(id.to_string(), processors.to_vec());
        Ok(())
    }

    async fn put_index_template(
        &self,
        name: &str,
        index_patterns: &str,
        version: u32,
        template: &Value,
    ) -> StoreResult<()> {
        self.templates.lock().unwrap().insert(
            name.to_string(),
            json!({
                "index_patterns": [index_patterns],
                "version": version,
                "template": template,
            }),
        );
        Ok(())
    }

    async fn enrich_policy_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.policies.lock().unwrap().contains(name))
    }

    async fn put_enrich_policy(&self, name: &str, _match_def: &Value) -> StoreResult<()> {
        self.policies.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn execute_enrich_policy(&self, _name: &str) -> StoreResult<()> {
        Ok(())
    }

    async fn delete_enrich_policy(&self, name: &str) -> StoreResult<()> {
        self.policies.lock().unwrap().remove(name);
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let docs = self.docs.lock().unwrap();
        let mut indices: Vec<String> = docs
            .keys()
            .map(|(index, _)| index.clone())
            .filter(|index| index_matches(pattern, index))
            .collect();
        indices.dedup();
        Ok(indices)
    }

    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        self.docs
            .lock()
            .unwrap()
            .retain(|(doc_index, _), _| doc_index != index);
        Ok(())
    }
}
