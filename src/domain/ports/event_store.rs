//! Document store port.
//!
//! Typed facade over the event document database. Search results come back
//! as a [`SearchResponse`] which callers collapse into the shape they need:
//! raw (total + hits), hit list, first hit, or exactly-one hit.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::errors::DomainResult;
use crate::domain::models::EventDoc;

/// Store failures, classified for retry decisions.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: [{index}] {id}")]
    NotFound { index: String, id: String },

    /// Concurrent writer or create-on-existing-id.
    #[error("Document conflict: {0}")]
    Conflict(String),

    /// Anything worth retrying: transport failures, 5xx, timeouts.
    #[error("Store request failed: {0}")]
    Transient(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A document as returned by get/search.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub index: String,
    pub id: String,
    pub source: Value,
}

impl StoredDocument {
    /// Typed view of the source for event documents.
    pub fn event(&self) -> DomainResult<EventDoc> {
        EventDoc::from_value(&self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Boolean query builder covering the clauses the correlator uses:
/// `term` (exact keyword match, optionally case-insensitive), `range`,
/// `exists`, and a `should` list with `minimum_should_match`.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    must: Vec<Value>,
    must_not: Vec<Value>,
    should: Vec<Value>,
    minimum_should_match: Option<u32>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must_term(mut self, field: &str, value: &str) -> Self {
        self.must
            .push(serde_json::json!({ "term": { format!("{field}.keyword"): value } }));
        self
    }

    pub fn must_term_case_insensitive(mut self, field: &str, value: &str) -> Self {
        self.must.push(serde_json::json!({
            "term": {
                format!("{field}.keyword"): { "value": value, "case_insensitive": true }
            }
        }));
        self
    }

    pub fn must_range_lte(mut self, field: &str, value: &str) -> Self {
        self.must
            .push(serde_json::json!({ "range": { field: { "lte": value } } }));
        self
    }

    pub fn must_not_exists(mut self, field: &str) -> Self {
        self.must_not
            .push(serde_json::json!({ "exists": { "field": field } }));
        self
    }

    pub fn should_term(mut self, field: &str, value: &str) -> Self {
        self.should
            .push(serde_json::json!({ "term": { format!("{field}.keyword"): value } }));
        self
    }

    pub fn minimum_should_match(mut self, n: u32) -> Self {
        self.minimum_should_match = Some(n);
        self
    }

    pub fn into_value(self) -> Value {
        let mut body = serde_json::Map::new();
        if !self.must.is_empty() {
            body.insert("must".to_string(), Value::Array(self.must));
        }
        if !self.must_not.is_empty() {
            body.insert("must_not".to_string(), Value::Array(self.must_not));
        }
        if !self.should.is_empty() {
            body.insert("should".to_string(), Value::Array(self.should));
        }
        if let Some(n) = self.minimum_should_match {
            body.insert("minimum_should_match".to_string(), Value::from(n));
        }
        serde_json::json!({ "bool": body })
    }
}

/// A search against one index or an index glob.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub index: String,
    pub query: SearchQuery,
    pub sort: Option<(String, SortOrder)>,
    pub size: Option<u32>,
    pub exclude_fields: Vec<String>,
}

impl SearchRequest {
    pub fn new(index: impl Into<String>, query: SearchQuery) -> Self {
        Self {
            index: index.into(),
            query,
            sort: None,
            size: None,
            exclude_fields: vec![],
        }
    }

    pub fn sort(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some((field.to_string(), order));
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn exclude_field(mut self, field: &str) -> Self {
        self.exclude_fields.push(field.to_string());
        self
    }
}

/// Raw search result; collapse with the helpers below.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<StoredDocument>,
}

impl SearchResponse {
    pub fn into_hits(self) -> Vec<StoredDocument> {
        self.hits
    }

    pub fn into_first(self) -> Option<StoredDocument> {
        self.hits.into_iter().next()
    }

    /// `Some` only when the search matched exactly one document.
    pub fn into_exactly_one(self) -> Option<StoredDocument> {
        if self.hits.len() == 1 {
            self.hits.into_iter().next()
        } else {
            None
        }
    }
}

/// One entry of a bulk partial-update call.
#[derive(Debug, Clone)]
pub struct BulkUpdate {
    pub index: String,
    pub id: String,
    pub doc: Value,
}

/// Port to the event document store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch a document; `None` when it does not exist.
    async fn get(&self, index: &str, id: &str) -> StoreResult<Option<StoredDocument>>;

    /// Index a document, optionally through an ingest pipeline. With
    /// `create` set the call fails with [`StoreError::Conflict`] when the id
    /// already exists.
    async fn index(
        &self,
        index: &str,
        id: &str,
        pipeline: Option<&str>,
        document: &Value,
        create: bool,
    ) -> StoreResult<()>;

    /// Partial-merge `doc` into an existing document.
    async fn update(&self, index: &str, id: &str, doc: &Value) -> StoreResult<()>;

    /// Apply several partial updates in one call.
    async fn bulk_update(&self, operations: &[BulkUpdate]) -> StoreResult<()>;

    async fn search(&self, request: SearchRequest) -> StoreResult<SearchResponse>;

    // Configuration-time surface: pipelines, enrich policies, templates,
    // index lifecycle.

    async fn put_ingest_pipeline(&self, id: &str, processors: &[Value]) -> StoreResult<()>;

    async fn put_index_template(
        &self,
        name: &str,
        index_patterns: &str,
        version: u32,
        template: &Value,
    ) -> StoreResult<()>;

    async fn enrich_policy_exists(&self, name: &str) -> StoreResult<bool>;

    async fn put_enrich_policy(&self, name: &str, match_def: &Value) -> StoreResult<()>;

    async fn execute_enrich_policy(&self, name: &str) -> StoreResult<()>;

    async fn delete_enrich_policy(&self, name: &str) -> StoreResult<()>;

    async fn list_indices(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn delete_index(&self, index: &str) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_assembles_bool_clauses() {
        let query = SearchQuery::new()
            .must_term("event_type", "down")
            .must_term_case_insensitive("asset_unique_id", "SRV01")
            .must_range_lte("event_ts", "2024-01-01T00:00:00Z")
            .must_not_exists("linked_event_id")
            .should_term("status", "new")
            .should_term("status", "alerted")
            .minimum_should_match(1)
            .into_value();

        let bool_query = &query["bool"];
        assert_eq!(bool_query["must"].as_array().unwrap().len(), 3);
        assert_eq!(
            bool_query["must"][1]["term"]["asset_unique_id.keyword"]["case_insensitive"],
            true
        );
        assert_eq!(bool_query["must_not"][0]["exists"]["field"], "linked_event_id");
        assert_eq!(bool_query["should"].as_array().unwrap().len(), 2);
        assert_eq!(bool_query["minimum_should_match"], 1);
    }

    #[test]
    fn exactly_one_rejects_multiple_hits() {
        let doc = |id: &str| StoredDocument {
            index: "events-20240101".to_string(),
            id: id.to_string(),
            source: Value::Null,
        };
        let two = SearchResponse { total: 2, hits: vec![doc("a"), doc("b")] };
        assert!(two.into_exactly_one().is_none());

        let one = SearchResponse { total: 1, hits: vec![doc("a")] };
        assert_eq!(one.into_exactly_one().unwrap().id, "a");
    }
}
