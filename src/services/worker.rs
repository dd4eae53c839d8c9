//! Queue worker loop.
//!
//! Claims due tasks in batches and hands each to the dispatcher. A fatal
//! handler error completes the task without a follow-on; the event's error
//! log is the operator's signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::domain::ports::TaskQueue;
use crate::services::dispatcher::Dispatcher;

pub struct Worker {
    dispatcher: Arc<Dispatcher>,
    queue: Arc<dyn TaskQueue>,
    worker_id: String,
    poll_interval: Duration,
    batch_size: u32,
}

impl Worker {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        queue: Arc<dyn TaskQueue>,
        worker_id: String,
        poll_interval: Duration,
        batch_size: u32,
    ) -> Self {
        Self { dispatcher, queue, worker_id, poll_interval, batch_size }
    }

    pub async fn run(&self) {
        info!(worker_id = %self.worker_id, "worker started");
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.drain_due_tasks().await {
                error!(worker_id = %self.worker_id, reason = %e, "worker poll failed");
            }
        }
    }

    async fn drain_due_tasks(&self) -> crate::domain::errors::DomainResult<()> {
        loop {
            let tasks = self.queue.claim_due(&self.worker_id, self.batch_size).await?;
            if tasks.is_empty() {
                return Ok(());
            }
            for task in tasks {
                if let Err(e) = self.dispatcher.dispatch(&task).await {
                    error!(task = %task.kind, entity_id = task.entity_id, reason = %e,
                           "task aborted");
                }
                self.queue.complete(task.id).await?;
            }
        }
    }
}
