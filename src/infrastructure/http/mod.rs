//! HTTP ingress.
//!
//! Three routes: event logging (POST/PUT), stored-event lookup (GET), and
//! manual resolve (POST). Every request is recorded as an ingress log row
//! before anything else; accepted requests enqueue their task and return
//! immediately.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use chrono::Duration;
use serde_json::Value;
use tracing::{error, info};

use crate::domain::errors::DomainError;
use crate::domain::models::event::field;
use crate::domain::models::config::CsvFieldRule;
use crate::domain::models::{IngressMethod, IngressStatus, IngressTask, NewIngressLog};
use crate::domain::ports::{
    EventStore, IngressLogRepository, RuleRepository, TaskKind, TaskQueue,
};
use crate::infrastructure::payload::expand_csv_fields;

/// Source IP assumed when no forwarding header is present.
const FALLBACK_REMOTE_IP: &str = "127.0.0.1";

#[derive(Clone)]
pub struct AppState {
    pub ingress: Arc<dyn IngressLogRepository>,
    pub queue: Arc<dyn TaskQueue>,
    pub store: Arc<dyn EventStore>,
    pub rules: Arc<dyn RuleRepository>,
    pub csv_fields: Arc<Vec<CsvFieldRule>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/event/", any(log_event))
        .route("/event/:event_index/:event_id", get(event_info))
        .route("/resolve/", any(resolve))
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "HTTP ingress listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

struct AppError(DomainError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(reason = %self.0, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

fn remote_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| FALLBACK_REMOTE_IP.to_string())
}

async fn log_event(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let remote_ip = remote_ip(&headers);
    let method_name = method.as_str().to_lowercase();
    info!(%remote_ip, method = %method_name, "new event");

    let Some(ingress_method) = IngressMethod::from_str(&method_name) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            format!("Invalid request method [{method_name}]"),
        )
            .into_response());
    };

    let mut event_data: Value = if body.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        match serde_json::from_slice(&body) {
            Ok(data) => data,
            Err(_) => {
                return Ok((StatusCode::BAD_REQUEST, "Invalid JSON body").into_response());
            }
        }
    };
    expand_csv_fields(&mut event_data, &state.csv_fields);

    let log = state
        .ingress
        .create(&NewIngressLog {
            remote_ip: remote_ip.clone(),
            method: ingress_method,
            task: IngressTask::Event,
            task_data: event_data,
        })
        .await?;

    if ingress_method.is_valid_event_method() {
        // Unknown source IPs auto-register unmapped.
        state.rules.register_ip(&remote_ip).await?;
        state
            .queue
            .enqueue(TaskKind::IngestEvent, log.id, Duration::zero())
            .await?;
        return Ok(StatusCode::ACCEPTED.into_response());
    }

    let reason = format!("Invalid request method [{method_name}]");
    state
        .ingress
        .set_status(log.id, IngressStatus::Failed, &reason)
        .await?;
    Ok((StatusCode::BAD_REQUEST, reason).into_response())
}

async fn event_info(
    State(state): State<AppState>,
    Path((event_index, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let stored = state
        .store
        .get(&event_index, &event_id)
        .await
        .map_err(|e| DomainError::StoreError(e.to_string()))?;

    Ok(Json(match stored {
        Some(doc) => serde_json::json!({
            "_index": doc.index,
            "_id": doc.id,
            "_source": doc.source,
        }),
        None => Value::Null,
    }))
}

async fn resolve(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let remote_ip = remote_ip(&headers);
    let method_name = method.as_str().to_lowercase();
    info!(%remote_ip, method = %method_name, "resolve event");

    let resolve_data: Value = if body.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        match serde_json::from_slice(&body) {
            Ok(data) => data,
            Err(_) => {
                return Ok((StatusCode::BAD_REQUEST, "Invalid JSON body").into_response());
            }
        }
    };

    let ingress_method =
        IngressMethod::from_str(&method_name).unwrap_or(IngressMethod::Get);
    let log = state
        .ingress
        .create(&NewIngressLog {
            remote_ip,
            method: ingress_method,
            task: IngressTask::Resolve,
            task_data: resolve_data.clone(),
        })
        .await?;

    if method != Method::POST {
        let reason = format!("Invalid request method [{method_name}]");
        state
            .ingress
            .set_status(log.id, IngressStatus::Failed, &reason)
            .await?;
        return Ok((StatusCode::BAD_REQUEST, reason).into_response());
    }

    if resolve_data.get(field::ITSM_TICKET).is_none() {
        let reason = format!("Missing {}", field::ITSM_TICKET);
        state
            .ingress
            .set_status(log.id, IngressStatus::Failed, &reason)
            .await?;
        return Ok((StatusCode::BAD_REQUEST, reason).into_response());
    }

    state
        .queue
        .enqueue(TaskKind::ResolveEvent, log.id, Duration::zero())
        .await?;
    // The external ticket system insists on a 200 for its webhook; 202
    // would be the honest status.
    Ok(StatusCode::OK.into_response())
}
