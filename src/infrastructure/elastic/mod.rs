//! Elasticsearch-compatible document store client.
//!
//! Thin REST adapter behind the [`EventStore`] port. Connection pooling and
//! the per-call timeout come from the shared `reqwest::Client`; failures are
//! classified into not-found / conflict / transient so callers can decide
//! what retries.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::domain::models::config::StoreConfig;
use crate::domain::ports::event_store::{
    BulkUpdate, EventStore, SearchRequest, SearchResponse, StoreError, StoreResult, StoredDocument,
};

pub struct ElasticStore {
    http_client: ReqwestClient,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| StoreError::Transient(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http_client
            .request(method, format!("{}/{path}", self.base_url));
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_deref());
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))
    }

    /// Map a non-success response onto the error taxonomy.
    async fn fail(response: Response) -> StoreError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error response".to_string());
        match status {
            StatusCode::NOT_FOUND => StoreError::NotFound {
                index: String::new(),
                id: String::new(),
            },
            StatusCode::CONFLICT => StoreError::Conflict(body),
            _ => StoreError::Transient(format!("[{status}] {body}")),
        }
    }

    async fn json_body(response: Response) -> StoreResult<Value> {
        response
            .json()
            .await
            .map_err(|e| StoreError::Transient(format!("bad response body: {e}")))
    }
}

#[async_trait]
impl EventStore for ElasticStore {
    async fn get(&self, index: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        let response = self
            .send(self.request(Method::GET, &format!("{index}/_doc/{id}")))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        let body = Self::json_body(response).await?;
        Ok(Some(StoredDocument {
            index: body["_index"].as_str().unwrap_or(index).to_string(),
            id: body["_id"].as_str().unwrap_or(id).to_string(),
            source: body["_source"].clone(),
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
        let op = if create { "_create" } else { "_doc" };
        let mut builder = self
            .request(Method::PUT, &format!("{index}/{op}/{id}"))
            .json(document);
        if let Some(pipeline) = pipeline {
            builder = builder.query(&[("pipeline", pipeline)]);
        }

        let response = self.send(builder).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        debug!(index, id, "indexed document");
        Ok(())
    }

    async fn update(&self, index: &str, id: &str, doc: &Value) -> StoreResult<()> {
        let response = self
            .send(
                self.request(Method::POST, &format!("{index}/_update/{id}"))
                    .json(&json!({ "doc": doc })),
            )
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                index: index.to_string(),
                id: id.to_string(),
            }),
            status if status.is_success() => Ok(()),
            _ => Err(Self::fail(response).await),
        }
    }

    async fn bulk_update(&self, operations: &[BulkUpdate]) -> StoreResult<()> {
        if operations.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for op in operations {
            body.push_str(
                &json!({ "update": { "_index": op.index, "_id": op.id } }).to_string(),
            );
            body.push('\n');
            body.push_str(&json!({ "doc": op.doc }).to_string());
            body.push('\n');
        }

        let response = self
            .send(
                self.request(Method::POST, "_bulk")
                    .header("content-type", "application/x-ndjson")
                    .body(body),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        let result = Self::json_body(response).await?;
        if result["errors"].as_bool().unwrap_or(false) {
            return Err(StoreError::Transient(format!(
                "bulk update reported item errors: {}",
                result["items"]
            )));
        }
        Ok(())
    }

    async fn search(&self, request: SearchRequest) -> StoreResult<SearchResponse> {
        let mut body = json!({ "query": request.query.clone().into_value() });
        if let Some((field, order)) = &request.sort {
            body["sort"] = json!([{ field: { "order": order.as_str() } }]);
        }
        if let Some(size) = request.size {
            body["size"] = json!(size);
        }
        if !request.exclude_fields.is_empty() {
            body["_source"] = json!({ "excludes": request.exclude_fields });
        }

        let response = self
            .send(
                self.request(Method::POST, &format!("{}/_search", request.index))
                    .json(&body),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        let result = Self::json_body(response).await?;
        let total = result["hits"]["total"]["value"].as_u64().unwrap_or(0);
        let hits = result["hits"]["hits"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .map(|hit| StoredDocument {
                        index: hit["_index"].as_str().unwrap_or_default().to_string(),
                        id: hit["_id"].as_str().unwrap_or_default().to_string(),
                        source: hit["_source"].clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchResponse { total, hits })
    }

    async fn put_ingest_pipeline(&self, id: &str, processors: &[Value]) -> StoreResult<()> {
        let response = self
            .send(
                self.request(Method::PUT, &format!("_ingest/pipeline/{id}"))
                    .json(&json!({ "processors": processors })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(())
    }

    async fn put_index_template(
        &self,
        name: &str,
        index_patterns: &str,
        version: u32,
        template: &Value,
    ) -> StoreResult<()> {
        let response = self
            .send(
                self.request(Method::PUT, &format!("_index_template/{name}"))
                    .json(&json!({
                        "index_patterns": [index_patterns],
                        "version": version,
                        "template": template,
                    })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(())
    }

    async fn enrich_policy_exists(&self, name: &str) -> StoreResult<bool> {
        let response = self
            .send(self.request(Method::GET, &format!("_enrich/policy/{name}")))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let body = Self::json_body(response).await?;
        Ok(body["policies"]
            .as_array()
            .is_some_and(|policies| !policies.is_empty()))
    }

    async fn put_enrich_policy(&self, name: &str, match_def: &Value) -> StoreResult<()> {
        let response = self
            .send(
                self.request(Method::PUT, &format!("_enrich/policy/{name}"))
                    .json(&json!({ "match": match_def })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(())
    }

    async fn execute_enrich_policy(&self, name: &str) -> StoreResult<()> {
        let response = self
            .send(self.request(Method::PUT, &format!("_enrich/policy/{name}/_execute")))
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(())
    }

    async fn delete_enrich_policy(&self, name: &str) -> StoreResult<()> {
        let response = self
            .send(self.request(Method::DELETE, &format!("_enrich/policy/{name}")))
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let response = self.send(self.request(Method::GET, pattern)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let body = Self::json_body(response).await?;
        Ok(body
            .as_object()
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        let response = self.send(self.request(Method::DELETE, index)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(())
    }
}
