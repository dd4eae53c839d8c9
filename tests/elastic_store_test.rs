//! Document store client against a mocked HTTP endpoint.

use serde_json::json;

use conflux::domain::models::config::StoreConfig;
use conflux::domain::models::event::field;
use conflux::domain::ports::event_store::{
    BulkUpdate, EventStore, SearchQuery, SearchRequest, SortOrder, StoreError,
};
use conflux::infrastructure::elastic::ElasticStore;

fn store_for(url: &str) -> ElasticStore {
    let config = StoreConfig {
        url: url.to_string(),
        ..StoreConfig::default()
    };
    ElasticStore::new(&config).expect("client builds")
}

#[tokio::test]
async fn get_returns_the_source_and_none_for_missing() {
    let mut server = mockito::Server::new_async().await;
    let found = server
        .mock("GET", "/events-20240101/_doc/abc")
        .with_status(200)
        .with_body(
            json!({
                "_index": "events-20240101",
                "_id": "abc",
                "found": true,
                "_source": { "status": "new", "event_type": "down" },
            })
            .to_string(),
        )
        .create_async()
        .await;
    let missing = server
        .mock("GET", "/events-20240101/_doc/nope")
        .with_status(404)
        .with_body(json!({ "found": false }).to_string())
        .create_async()
        .await;

    let store = store_for(&server.url());

    let doc = store.get("events-20240101", "abc").await.unwrap().unwrap();
    assert_eq!(doc.id, "abc");
    assert_eq!(doc.source["status"], "new");
    let event = doc.event().unwrap();
    assert_eq!(event.status, Some(conflux::domain::models::EventStatus::New));

    assert!(store.get("events-20240101", "nope").await.unwrap().is_none());

    found.assert_async().await;
    missing.assert_async().await;
}

#[tokio::test]
async fn index_create_carries_the_pipeline_and_conflicts_are_typed() {
    let mut server = mockito::Server::new_async().await;
    let created = server
        .mock("PUT", "/events-20240101/_create/abc")
        .match_query(mockito::Matcher::UrlEncoded(
            "pipeline".to_string(),
            "event-pipeline".to_string(),
        ))
        .with_status(201)
        .with_body("{}")
        .create_async()
        .await;
    let conflicted = server
        .mock("PUT", "/events-20240101/_create/dup")
        .with_status(409)
        .with_body(json!({ "error": "version_conflict_engine_exception" }).to_string())
        .create_async()
        .await;

    let store = store_for(&server.url());
    let doc = json!({ "event_details": {} });

    store
        .index("events-20240101", "abc", Some("event-pipeline"), &doc, true)
        .await
        .unwrap();
    let err = store
        .index("events-20240101", "dup", None, &doc, true)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    created.assert_async().await;
    conflicted.assert_async().await;
}

#[tokio::test]
async fn update_wraps_the_partial_doc_and_classifies_missing() {
    let mut server = mockito::Server::new_async().await;
    let updated = server
        .mock("POST", "/events-20240101/_update/abc")
        .match_body(mockito::Matcher::Json(json!({ "doc": { "status": "alerted" } })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let missing = server
        .mock("POST", "/events-20240101/_update/nope")
        .with_status(404)
        .with_body("{}")
        .create_async()
        .await;

    let store = store_for(&server.url());
    store
        .update("events-20240101", "abc", &json!({ "status": "alerted" }))
        .await
        .unwrap();
    let err = store
        .update("events-20240101", "nope", &json!({ "status": "alerted" }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    updated.assert_async().await;
    missing.assert_async().await;
}

#[tokio::test]
async fn search_builds_the_body_and_parses_hits() {
    let mut server = mockito::Server::new_async().await;
    let searched = server
        .mock("POST", "/events-*/_search")
        .match_body(mockito::Matcher::PartialJson(json!({
            "size": 1000,
            "sort": [{ "event_ts": { "order": "desc" } }],
        })))
        .with_status(200)
        .with_body(
            json!({
                "hits": {
                    "total": { "value": 2 },
                    "hits": [
                        { "_index": "events-20240101", "_id": "a", "_source": { "status": "new" } },
                        { "_index": "events-20240102", "_id": "b", "_source": { "status": "alerted" } },
                    ],
                },
            })
            .to_string(),
        )
        .create_async()
        .await;

    let store = store_for(&server.url());
    let query = SearchQuery::new().must_term(field::EVENT_TYPE, "down");
    let request = SearchRequest::new("events-*", query)
        .sort(field::EVENT_TS, SortOrder::Desc)
        .size(1000);

    let response = store.search(request).await.unwrap();
    assert_eq!(response.total, 2);
    assert_eq!(response.hits.len(), 2);
    assert_eq!(response.hits[0].id, "a");
    assert_eq!(response.hits[1].index, "events-20240102");

    searched.assert_async().await;
}

#[tokio::test]
async fn bulk_item_errors_surface_as_transient() {
    let mut server = mockito::Server::new_async().await;
    let bulk = server
        .mock("POST", "/_bulk")
        .with_status(200)
        .with_body(json!({ "errors": true, "items": [{ "update": { "status": 404 } }] }).to_string())
        .create_async()
        .await;

    let store = store_for(&server.url());
    let err = store
        .bulk_update(&[BulkUpdate {
            index: "events-20240101".to_string(),
            id: "a".to_string(),
            doc: json!({ "linked_event_id": "b" }),
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transient(_)));

    bulk.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_transient() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/events-20240101/_doc/abc")
        .with_status(503)
        .with_body("busy")
        .create_async()
        .await;

    let store = store_for(&server.url());
    let err = store.get("events-20240101", "abc").await.unwrap_err();
    assert!(matches!(err, StoreError::Transient(_)));
}
