//! Deduplicated per-event error accumulator.
//!
//! Each distinct (event, status, message) failure holds one error-log row
//! whose repeat count grows on every recurrence. Past the threshold the
//! failure escalates to [`DomainError::RepeatedFailure`], which aborts the
//! running handler so the event stops spinning.

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EventRecord, ERROR_REPEAT_THRESHOLD};
use crate::domain::ports::{ErrorLogRepository, EventRecordRepository};

#[derive(Clone)]
pub struct ErrorReporter {
    error_logs: Arc<dyn ErrorLogRepository>,
    records: Arc<dyn EventRecordRepository>,
}

impl ErrorReporter {
    pub fn new(
        error_logs: Arc<dyn ErrorLogRepository>,
        records: Arc<dyn EventRecordRepository>,
    ) -> Self {
        Self { error_logs, records }
    }

    /// Record a failure, bump the event's retry counter, and escalate when
    /// the same failure has repeated past the threshold.
    pub async fn report(&self, record: &mut EventRecord, error_desc: &str) -> DomainResult<()> {
        self.report_with(record, error_desc, true, true).await
    }

    pub async fn report_with(
        &self,
        record: &mut EventRecord,
        error_desc: &str,
        incr_retry: bool,
        check_threshold: bool,
    ) -> DomainResult<()> {
        let entry = self
            .error_logs
            .record(record.id, record.status, error_desc)
            .await?;

        if incr_retry {
            record.retry_count += 1;
            self.records.update(record).await?;
        }

        if check_threshold && entry.repeat_count > ERROR_REPEAT_THRESHOLD {
            return Err(DomainError::RepeatedFailure {
                record_id: record.id,
                status: record.status.to_string(),
                error_desc: error_desc.to_string(),
            });
        }
        Ok(())
    }
}
