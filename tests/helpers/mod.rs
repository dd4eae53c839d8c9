//! Shared test harness: in-memory SQLite, an in-memory document store that
//! emulates the ingest pipeline, and a recording ticket client.

#![allow(dead_code)]

pub mod store;
pub mod tickets;

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use conflux::domain::models::correlation_rule::NewCorrelationRule;
use conflux::domain::models::{
    EventDoc, EventRecord, EventStatus, IngressLog, IngressMethod, IngressTask, NewIngressLog,
};
use conflux::domain::ports::{
    EventRecordRepository, IngressLogRepository, RuleRepository, TaskKind, TaskQueue,
};
use conflux::infrastructure::database::{
    create_test_pool, Migrator, SqliteClusterLock, SqliteErrorLogRepository,
    SqliteEventRecordRepository, SqliteIngressLogRepository, SqliteRuleRepository,
    SqliteTaskQueue,
};
use conflux::services::{
    CorrelatorContext, CorrelatorSettings, Dispatcher, ErrorReporter, RuleResolver,
};

pub use store::{AssetInfo, MemoryEventStore};
pub use tickets::{RecordingTicketClient, TicketOp};

pub const WORKER_ID: &str = "worker-test";

pub async fn setup_test_db() -> SqlitePool {
    let pool = create_test_pool().await.expect("failed to create test pool");
    Migrator::new(pool.clone())
        .run_embedded_migrations()
        .await
        .expect("failed to run migrations");
    pool
}

pub struct TestHarness {
    pub pool: SqlitePool,
    pub store: Arc<MemoryEventStore>,
    pub tickets: Arc<RecordingTicketClient>,
    pub records: Arc<SqliteEventRecordRepository>,
    pub ingress: Arc<SqliteIngressLogRepository>,
    pub rules: Arc<SqliteRuleRepository>,
    pub queue: Arc<SqliteTaskQueue>,
    pub lock: Arc<SqliteClusterLock>,
    pub ctx: Arc<CorrelatorContext>,
    pub dispatcher: Dispatcher,
}

impl TestHarness {
    pub async fn new() -> Self {
        let pool = setup_test_db().await;
        let store = Arc::new(MemoryEventStore::new());
        let tickets = Arc::new(RecordingTicketClient::new());
        let records = Arc::new(SqliteEventRecordRepository::new(pool.clone()));
        let ingress = Arc::new(SqliteIngressLogRepository::new(pool.clone()));
        let error_logs = Arc::new(SqliteErrorLogRepository::new(pool.clone()));
        let rules = Arc::new(SqliteRuleRepository::new(pool.clone()));
        let queue = Arc::new(SqliteTaskQueue::new(pool.clone()));
        let lock = Arc::new(SqliteClusterLock::new(pool.clone()));

        let ctx = Arc::new(CorrelatorContext {
            store: store.clone(),
            tickets: tickets.clone(),
            records: records.clone(),
            ingress: ingress.clone(),
            rule_repo: rules.clone(),
            rules: RuleResolver::new(rules.clone()),
            errors: ErrorReporter::new(error_logs, records.clone()),
            settings: CorrelatorSettings {
                environment: "dev".to_string(),
                main_pipeline: "event-pipeline".to_string(),
            },
        });
        let dispatcher = Dispatcher::new(
            ctx.clone(),
            queue.clone(),
            WORKER_ID.to_string(),
            ChronoDuration::seconds(120),
        );

        Self { pool, store, tickets, records, ingress, rules, queue, lock, ctx, dispatcher }
    }

    /// Map a source IP to a tool and give it a correlation rule, the way an
    /// operator would configure it.
    pub async fn configure_rule(
        &self,
        ip: &str,
        tool_name: &str,
        event_title: &str,
        mutate: impl FnOnce(&mut NewCorrelationRule),
    ) {
        let tool = self.rules.upsert_tool(tool_name).await.expect("upsert tool");
        self.rules.map_ip(ip, Some(tool.id)).await.expect("map ip");
        let mut rule = NewCorrelationRule::with_defaults(tool.id, event_title);
        mutate(&mut rule);
        self.rules.upsert_rule(&rule).await.expect("upsert rule");
    }

    /// Mirror of the HTTP event route: log the payload and enqueue the
    /// ingest task.
    pub async fn post_event(&self, remote_ip: &str, payload: Value) -> IngressLog {
        let log = self
            .ingress
            .create(&NewIngressLog {
                remote_ip: remote_ip.to_string(),
                method: IngressMethod::Post,
                task: IngressTask::Event,
                task_data: payload,
            })
            .await
            .expect("create ingress log");
        self.rules.register_ip(remote_ip).await.expect("register ip");
        self.queue
            .enqueue(TaskKind::IngestEvent, log.id, ChronoDuration::zero())
            .await
            .expect("enqueue ingest");
        log
    }

    /// Mirror of the HTTP resolve route.
    pub async fn post_resolve(&self, ticket_id: i64) -> IngressLog {
        let log = self
            .ingress
            .create(&NewIngressLog {
                remote_ip: "127.0.0.1".to_string(),
                method: IngressMethod::Post,
                task: IngressTask::Resolve,
                task_data: json!({ "itsm_ticket": ticket_id }),
            })
            .await
            .expect("create ingress log");
        self.queue
            .enqueue(TaskKind::ResolveEvent, log.id, ChronoDuration::zero())
            .await
            .expect("enqueue resolve");
        log
    }

    /// Make every scheduled follow-on due immediately.
    pub async fn fast_forward_queue(&self) {
        let past = (Utc::now() - ChronoDuration::seconds(1)).to_rfc3339();
        sqlx::query("UPDATE dispatch_queue SET run_at = ? WHERE claimed_by IS NULL")
            .bind(past)
            .execute(&self.pool)
            .await
            .expect("fast forward queue");
    }

    /// Process up to `max_tasks` queued tasks, fast-forwarding delays.
    /// Returns the number actually processed (less than the cap only when
    /// the queue drained).
    pub async fn run_tasks(&self, max_tasks: usize) -> usize {
        let mut processed = 0;
        while processed < max_tasks {
            self.fast_forward_queue().await;
            let tasks = self.queue.claim_due(WORKER_ID, 1).await.expect("claim due");
            let Some(task) = tasks.into_iter().next() else {
                return processed;
            };
            if let Err(e) = self.dispatcher.dispatch(&task).await {
                panic!("task {task:?} aborted: {e}");
            }
            self.queue.complete(task.id).await.expect("complete task");
            processed += 1;
        }
        processed
    }

    /// Process tasks until the queue is idle; panics if it does not settle
    /// within the cap.
    pub async fn run_until_idle(&self, max_tasks: usize) -> usize {
        let processed = self.run_tasks(max_tasks).await;
        assert!(processed < max_tasks, "queue did not settle within {max_tasks} tasks");
        processed
    }

    /// Process tasks until the record reaches `status`; panics if it does
    /// not within the cap.
    pub async fn run_until_status(&self, record_id: i64, status: EventStatus, max_tasks: usize) {
        for _ in 0..max_tasks {
            if self.record(record_id).await.status == status {
                return;
            }
            if self.run_tasks(1).await == 0 {
                break;
            }
        }
        let record = self.record(record_id).await;
        assert_eq!(
            record.status, status,
            "record {record_id} settled in {:?} instead of {status:?}",
            record.status
        );
    }

    pub async fn record(&self, id: i64) -> EventRecord {
        self.records
            .get(id)
            .await
            .expect("get record")
            .expect("record exists")
    }

    /// The single event record created for an ingress log, if any.
    pub async fn try_record_for_log(&self, log_id: i64) -> Option<EventRecord> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM event_records WHERE ingress_log_id = ?")
                .bind(log_id)
                .fetch_optional(&self.pool)
                .await
                .expect("record for ingress log");
        match row {
            Some((id,)) => Some(self.record(id).await),
            None => None,
        }
    }

    /// Process tasks until the ingress log has produced its event record.
    /// Other pending tasks may run along the way.
    pub async fn ingest_record(&self, log_id: i64, max_tasks: usize) -> EventRecord {
        for _ in 0..max_tasks {
            if let Some(record) = self.try_record_for_log(log_id).await {
                return record;
            }
            if self.run_tasks(1).await == 0 {
                break;
            }
        }
        self.try_record_for_log(log_id)
            .await
            .expect("ingress log never produced an event record")
    }

    pub async fn doc(&self, record: &EventRecord) -> EventDoc {
        self.store
            .doc_source(&record.doc_index, &record.doc_id)
            .map(|source| EventDoc::from_value(&source).expect("valid event doc"))
            .expect("stored doc exists")
    }
}

/// An event payload in the shape the default extraction expects.
pub fn event_payload(
    asset: &str,
    title: &str,
    event_type: &str,
    event_ts: DateTime<Utc>,
) -> Value {
    json!({
        "asset_unique_id": asset,
        "event_title": title,
        "event_type": event_type,
        "event_level": "critical",
        "event_desc": format!("{title} on {asset}"),
        "event_ts": event_ts.to_rfc3339(),
    })
}
