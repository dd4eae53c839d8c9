//! Task dispatcher.
//!
//! Runs one queued task against its entity row under a non-blocking
//! row-exclusive claim. A failed claim is never retried in place: the
//! handler that holds the row schedules its own follow-on, so progress is
//! preserved without two handlers ever touching one event concurrently.
//! Follow-on enqueues happen only after the handler returns without a fatal
//! error, so an aborted handler schedules no phantom work.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{EventStatus, EventType, IngressStatus};
use crate::domain::ports::repositories::ClaimOutcome;
use crate::domain::ports::{follow_on_for, QueuedTask, TaskKind, TaskQueue};
use crate::services::context::CorrelatorContext;
use crate::services::correlator;

/// Start preconditions per handler: required status set and, for event
/// tasks, required event type set.
fn preconditions(kind: TaskKind) -> (&'static [EventStatus], &'static [EventType]) {
    match kind {
        TaskKind::NewUpEvent => (&[EventStatus::New], &[EventType::Up]),
        TaskKind::NewDownEvent => (&[EventStatus::New], &[EventType::Down]),
        TaskKind::SuppressedEvent => (&[EventStatus::Suppressed], &[EventType::Down]),
        TaskKind::CreatingTicketEvent => (&[EventStatus::CreatingTicket], &[EventType::Down]),
        TaskKind::AlertedEvent => (&[EventStatus::Alerted], &[EventType::Down]),
        TaskKind::ResolvingEvent => (&[EventStatus::Resolving], &[EventType::Down]),
        TaskKind::IngestEvent | TaskKind::ResolveEvent => (&[], &[]),
    }
}

pub struct Dispatcher {
    ctx: Arc<CorrelatorContext>,
    queue: Arc<dyn TaskQueue>,
    worker_id: String,
    lock_lease: Duration,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<CorrelatorContext>,
        queue: Arc<dyn TaskQueue>,
        worker_id: String,
        lock_lease: Duration,
    ) -> Self {
        Self { ctx, queue, worker_id, lock_lease }
    }

    pub async fn dispatch(&self, task: &QueuedTask) -> DomainResult<()> {
        debug!(task = %task.kind, entity_id = task.entity_id, "task starting");
        let result = if task.kind.is_ingress_task() {
            self.run_ingress_task(task).await
        } else {
            self.run_event_task(task).await
        };
        if result.is_ok() {
            debug!(task = %task.kind, entity_id = task.entity_id, "task completed");
        }
        result
    }

    async fn run_event_task(&self, task: &QueuedTask) -> DomainResult<()> {
        let until = Utc::now() + self.lock_lease;
        match self.ctx.records.claim(task.entity_id, &self.worker_id, until).await? {
            ClaimOutcome::Missing => {
                error!(task = %task.kind, entity_id = task.entity_id, "event record does not exist");
                return Ok(());
            }
            ClaimOutcome::Contended => {
                warn!(task = %task.kind, entity_id = task.entity_id, "failed to get lock on event record");
                if let Some(mut record) = self.ctx.records.get(task.entity_id).await? {
                    self.ctx
                        .errors
                        .report_with(
                            &mut record,
                            &format!("Failed to get lock [Task: {}]", task.kind),
                            false,
                            true,
                        )
                        .await?;
                }
                return Ok(());
            }
            ClaimOutcome::Claimed => {}
        }

        let result = self.run_claimed_event_task(task).await;
        self.ctx.records.release(task.entity_id, &self.worker_id).await?;
        result
    }

    async fn run_claimed_event_task(&self, task: &QueuedTask) -> DomainResult<()> {
        let Some(mut record) = self.ctx.records.get(task.entity_id).await? else {
            error!(task = %task.kind, entity_id = task.entity_id, "event record does not exist");
            return Ok(());
        };

        let (valid_status, valid_types) = preconditions(task.kind);
        if !valid_status.contains(&record.status) {
            warn!(task = %task.kind, entity_id = task.entity_id, status = %record.status,
                  "invalid status");
            self.ctx
                .errors
                .report_with(&mut record, &format!("Invalid Status [Task: {}]", task.kind), false, true)
                .await?;
            return Ok(());
        }
        if !valid_types.contains(&record.event_type) {
            warn!(task = %task.kind, entity_id = task.entity_id, event_type = %record.event_type,
                  "invalid event type");
            self.ctx
                .errors
                .report_with(&mut record, &format!("Invalid Event Type [Task: {}]", task.kind), false, true)
                .await?;
            return Ok(());
        }

        correlator::run_event_handler(task.kind, &self.ctx, &mut record).await?;
        self.enqueue_follow_on(&record).await
    }

    async fn run_ingress_task(&self, task: &QueuedTask) -> DomainResult<()> {
        let until = Utc::now() + self.lock_lease;
        match self.ctx.ingress.claim(task.entity_id, &self.worker_id, until).await? {
            ClaimOutcome::Missing => {
                error!(task = %task.kind, entity_id = task.entity_id, "ingress log does not exist");
                return Ok(());
            }
            ClaimOutcome::Contended => {
                warn!(task = %task.kind, entity_id = task.entity_id, "failed to get lock on ingress log");
                return Ok(());
            }
            ClaimOutcome::Claimed => {}
        }

        let result = self.run_claimed_ingress_task(task).await;
        self.ctx.ingress.release(task.entity_id, &self.worker_id).await?;
        result
    }

    async fn run_claimed_ingress_task(&self, task: &QueuedTask) -> DomainResult<()> {
        let Some(mut log) = self.ctx.ingress.get(task.entity_id).await? else {
            error!(task = %task.kind, entity_id = task.entity_id, "ingress log does not exist");
            return Ok(());
        };
        if log.status != IngressStatus::New {
            warn!(task = %task.kind, entity_id = task.entity_id, status = log.status.as_str(),
                  "invalid status");
            return Ok(());
        }

        match task.kind {
            TaskKind::IngestEvent => {
                if let Some(record) = correlator::ingest::run(&self.ctx, &mut log).await? {
                    self.enqueue_follow_on(&record).await?;
                }
            }
            TaskKind::ResolveEvent => {
                correlator::manual_resolve::run(&self.ctx, &mut log).await?;
            }
            _ => unreachable!("event task routed to ingress path"),
        }
        Ok(())
    }

    async fn enqueue_follow_on(
        &self,
        record: &crate::domain::models::EventRecord,
    ) -> DomainResult<()> {
        if let Some((kind, delay)) = follow_on_for(record) {
            self.queue.enqueue(kind, record.id, delay).await?;
            debug!(record_id = record.id, follow_on = %kind, delay_secs = delay.num_seconds(),
                   "follow-on scheduled");
        } else {
            debug!(record_id = record.id, status = %record.status, "event is inactive");
        }
        Ok(())
    }
}
