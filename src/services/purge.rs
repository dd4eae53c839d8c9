//! Purge housekeeping.
//!
//! Two jobs: drop completed events and orphan ingress logs from the
//! database, and drop aged event indices that hold no open event.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::event::field;
use crate::domain::models::{
    event_index_is_older_than, config::RetentionConfig, EVENT_INDEX_PATTERN,
    NON_COMPLETE_EVENT_STATUS,
};
use crate::domain::ports::{
    EventRecordRepository, EventStore, IngressLogRepository, SearchQuery, SearchRequest,
};

pub struct PurgeService {
    records: Arc<dyn EventRecordRepository>,
    ingress: Arc<dyn IngressLogRepository>,
    store: Arc<dyn EventStore>,
    retention: RetentionConfig,
}

impl PurgeService {
    pub fn new(
        records: Arc<dyn EventRecordRepository>,
        ingress: Arc<dyn IngressLogRepository>,
        store: Arc<dyn EventStore>,
        retention: RetentionConfig,
    ) -> Self {
        Self { records, ingress, store, retention }
    }

    /// Remove old completed events and old ingress logs without an event.
    pub async fn purge_database(&self) -> DomainResult<(u64, u64)> {
        info!("purging events and ingress logs");
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention.event_days));
        let events = self.records.delete_completed_before(cutoff).await?;
        let logs = self.ingress.delete_orphans_before(cutoff).await?;
        info!(events, logs, "purged events and ingress logs");
        Ok((events, logs))
    }

    /// Remove event indices past the retention window whose documents have
    /// all reached a terminal status. Returns the number of dropped indices.
    pub async fn purge_event_indices(&self) -> DomainResult<u64> {
        let indices = self
            .store
            .list_indices(EVENT_INDEX_PATTERN)
            .await
            .map_err(|e| DomainError::StoreError(e.to_string()))?;

        let today = Utc::now().date_naive();
        let days = i64::from(self.retention.index_days);
        let mut dropped = 0;
        for index in indices {
            if event_index_is_older_than(&index, days, today)?
                && !self.index_has_open_event(&index).await?
            {
                debug!(%index, "deleting event index");
                self.store
                    .delete_index(&index)
                    .await
                    .map_err(|e| DomainError::StoreError(e.to_string()))?;
                info!(%index, "deleted event index");
                dropped += 1;
            } else {
                debug!(%index, "event index skipped");
            }
        }
        Ok(dropped)
    }

    async fn index_has_open_event(&self, index: &str) -> DomainResult<bool> {
        let query = NON_COMPLETE_EVENT_STATUS
            .iter()
            .fold(SearchQuery::new(), |q, s| q.should_term(field::EVENT_STATUS, s.as_str()))
            .minimum_should_match(1);
        let response = self
            .store
            .search(SearchRequest::new(index, query).size(1))
            .await
            .map_err(|e| DomainError::StoreError(e.to_string()))?;
        Ok(response.total > 0)
    }
}
