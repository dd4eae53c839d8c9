//! Repository tests on an in-memory database.

mod helpers;

use chrono::{Duration, Utc};

use conflux::domain::models::{
    EventStatus, EventType, IngressMethod, IngressStatus, IngressTask, NewEventRecord,
    NewIngressLog,
};
use conflux::domain::ports::cluster_lock::ClusterLock;
use conflux::domain::ports::repositories::{
    ClaimOutcome, ErrorLogRepository, EventRecordRepository, IngressLogRepository, RuleRepository,
};
use conflux::domain::ports::{TaskKind, TaskQueue};
use conflux::infrastructure::database::{
    SqliteClusterLock, SqliteErrorLogRepository, SqliteEventRecordRepository,
    SqliteIngressLogRepository, SqliteRuleRepository, SqliteTaskQueue,
};

use helpers::setup_test_db;

async fn seed_log(repo: &SqliteIngressLogRepository) -> i64 {
    repo.create(&NewIngressLog {
        remote_ip: "10.0.0.9".to_string(),
        method: IngressMethod::Post,
        task: IngressTask::Event,
        task_data: serde_json::json!({"k": "v"}),
    })
    .await
    .expect("create ingress log")
    .id
}

fn new_record(ingress_log_id: i64, status: EventStatus) -> NewEventRecord {
    NewEventRecord {
        ingress_log_id,
        monitor_tool_ip: Some("10.0.0.9".to_string()),
        doc_id: format!("dev::10.0.0.9::2024010100000000000{ingress_log_id}"),
        doc_index: "events-20240101".to_string(),
        status,
        event_type: EventType::Down,
        event_ts: Utc::now(),
        title: Some("LINK DOWN".to_string()),
        level: Some("critical".to_string()),
        asset_unique_id: Some("SRV01".to_string()),
        asset_type: Some("server".to_string()),
    }
}

#[tokio::test]
async fn event_record_roundtrip_with_extras() {
    let pool = setup_test_db().await;
    let logs = SqliteIngressLogRepository::new(pool.clone());
    let repo = SqliteEventRecordRepository::new(pool.clone());
    let rules = SqliteRuleRepository::new(pool);
    rules.register_ip("10.0.0.9").await.unwrap();

    let log_id = seed_log(&logs).await;
    let mut record = repo.create(&new_record(log_id, EventStatus::New)).await.unwrap();
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.extras.ticket_id, None);

    record.status = EventStatus::Alerted;
    record.retry_count = 2;
    record.extras.ticket_id = Some(42);
    record.extras.asset_down_comment = true;
    repo.update(&record).await.unwrap();

    let loaded = repo.get(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, EventStatus::Alerted);
    assert_eq!(loaded.retry_count, 2);
    assert_eq!(loaded.extras.ticket_id, Some(42));
    assert!(loaded.extras.asset_down_comment);
    assert!(!loaded.extras.asset_up_comment);
}

#[tokio::test]
async fn alerted_down_events_are_found_by_ticket() {
    let pool = setup_test_db().await;
    let logs = SqliteIngressLogRepository::new(pool.clone());
    let repo = SqliteEventRecordRepository::new(pool.clone());
    let rules = SqliteRuleRepository::new(pool);
    rules.register_ip("10.0.0.9").await.unwrap();

    let log_a = seed_log(&logs).await;
    let log_b = seed_log(&logs).await;
    let mut alerted = repo.create(&new_record(log_a, EventStatus::Alerted)).await.unwrap();
    alerted.extras.ticket_id = Some(42);
    repo.update(&alerted).await.unwrap();

    // Same ticket id but not alerted: must not match.
    let mut resolved = repo.create(&new_record(log_b, EventStatus::Resolved)).await.unwrap();
    resolved.extras.ticket_id = Some(42);
    repo.update(&resolved).await.unwrap();

    let found = repo.find_alerted_down_by_ticket(42).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, alerted.id);

    assert!(repo.find_alerted_down_by_ticket(999).await.unwrap().is_empty());
}

#[tokio::test]
async fn claim_is_exclusive_until_released() {
    let pool = setup_test_db().await;
    let logs = SqliteIngressLogRepository::new(pool.clone());
    let repo = SqliteEventRecordRepository::new(pool.clone());
    let rules = SqliteRuleRepository::new(pool);
    rules.register_ip("10.0.0.9").await.unwrap();

    let log_id = seed_log(&logs).await;
    let record = repo.create(&new_record(log_id, EventStatus::New)).await.unwrap();
    let until = Utc::now() + Duration::seconds(60);

    assert_eq!(repo.claim(record.id, "a", until).await.unwrap(), ClaimOutcome::Claimed);
    assert_eq!(repo.claim(record.id, "b", until).await.unwrap(), ClaimOutcome::Contended);
    assert_eq!(repo.claim(9999, "b", until).await.unwrap(), ClaimOutcome::Missing);

    // Releasing with the wrong holder is a no-op.
    repo.release(record.id, "b").await.unwrap();
    assert_eq!(repo.claim(record.id, "b", until).await.unwrap(), ClaimOutcome::Contended);

    repo.release(record.id, "a").await.unwrap();
    assert_eq!(repo.claim(record.id, "b", until).await.unwrap(), ClaimOutcome::Claimed);
}

#[tokio::test]
async fn purge_removes_only_completed_events_and_orphan_logs() {
    let pool = setup_test_db().await;
    let logs = SqliteIngressLogRepository::new(pool.clone());
    let repo = SqliteEventRecordRepository::new(pool.clone());
    let rules = SqliteRuleRepository::new(pool.clone());
    rules.register_ip("10.0.0.9").await.unwrap();

    let log_active = seed_log(&logs).await;
    let log_done = seed_log(&logs).await;
    let orphan_log = seed_log(&logs).await;
    repo.create(&new_record(log_active, EventStatus::Alerted)).await.unwrap();
    repo.create(&new_record(log_done, EventStatus::Resolved)).await.unwrap();

    // Everything above is "old" relative to a future cutoff.
    let cutoff = Utc::now() + Duration::seconds(5);
    let deleted_events = repo.delete_completed_before(cutoff).await.unwrap();
    assert_eq!(deleted_events, 1);

    let deleted_logs = logs.delete_orphans_before(cutoff).await.unwrap();
    // The resolved event's log lost its record row, so it is an orphan now,
    // as is the never-ingested one.
    assert_eq!(deleted_logs, 2);
    assert!(logs.get(log_active).await.unwrap().is_some());
    assert!(logs.get(orphan_log).await.unwrap().is_none());
}

#[tokio::test]
async fn error_log_deduplicates_and_counts_repeats() {
    let pool = setup_test_db().await;
    let logs = SqliteIngressLogRepository::new(pool.clone());
    let records = SqliteEventRecordRepository::new(pool.clone());
    let errors = SqliteErrorLogRepository::new(pool.clone());
    let rules = SqliteRuleRepository::new(pool);
    rules.register_ip("10.0.0.9").await.unwrap();

    let log_id = seed_log(&logs).await;
    let record = records.create(&new_record(log_id, EventStatus::New)).await.unwrap();

    let first = errors.record(record.id, EventStatus::New, "boom").await.unwrap();
    assert_eq!(first.repeat_count, 1);

    let second = errors.record(record.id, EventStatus::New, "boom").await.unwrap();
    assert_eq!(second.repeat_count, 2);
    assert!(!second.resolved);
    assert_eq!(first.id, second.id);

    // A different message or status is its own row.
    let other = errors.record(record.id, EventStatus::New, "bang").await.unwrap();
    assert_eq!(other.repeat_count, 1);
    let alerted = errors.record(record.id, EventStatus::Alerted, "boom").await.unwrap();
    assert_eq!(alerted.repeat_count, 1);
}

#[tokio::test]
async fn queue_delivers_due_tasks_once() {
    let pool = setup_test_db().await;
    let queue = SqliteTaskQueue::new(pool);

    queue.enqueue(TaskKind::IngestEvent, 1, Duration::zero()).await.unwrap();
    queue.enqueue(TaskKind::NewDownEvent, 2, Duration::seconds(3600)).await.unwrap();

    let due = queue.claim_due("w1", 10).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].kind, TaskKind::IngestEvent);
    assert_eq!(due[0].entity_id, 1);

    // Claimed by w1; w2 sees nothing.
    assert!(queue.claim_due("w2", 10).await.unwrap().is_empty());

    queue.complete(due[0].id).await.unwrap();
    assert!(queue.claim_due("w1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn cluster_lock_serializes_holders_and_honors_the_lease() {
    let pool = setup_test_db().await;
    let lock = SqliteClusterLock::new(pool);

    assert!(lock.try_acquire("purge", "a", Duration::seconds(60)).await.unwrap());
    assert!(!lock.try_acquire("purge", "b", Duration::seconds(60)).await.unwrap());
    // A different name is independent.
    assert!(lock.try_acquire("other", "b", Duration::seconds(60)).await.unwrap());

    assert!(lock.release("purge", "a").await.unwrap());
    assert!(lock.try_acquire("purge", "b", Duration::seconds(60)).await.unwrap());

    // Expired leases are stolen; the late release then reports failure.
    assert!(lock.try_acquire("stale", "a", Duration::seconds(-5)).await.unwrap());
    assert!(lock.try_acquire("stale", "b", Duration::seconds(60)).await.unwrap());
    assert!(!lock.release("stale", "a").await.unwrap());
}

#[tokio::test]
async fn rule_lookup_follows_tool_and_ip_mappings() {
    let pool = setup_test_db().await;
    let rules = SqliteRuleRepository::new(pool);

    let tool = rules.upsert_tool("Net Watcher").await.unwrap();
    rules.map_ip("10.0.0.9", Some(tool.id)).await.unwrap();

    let found = rules.tool_for_ip("10.0.0.9").await.unwrap().unwrap();
    assert_eq!(found.id, tool.id);
    assert!(rules.tool_for_ip("10.0.0.10").await.unwrap().is_none());

    // Unknown IPs auto-register unmapped.
    let unmapped = rules.register_ip("10.0.0.10").await.unwrap();
    assert_eq!(unmapped.monitor_tool_id, None);
    assert_eq!(unmapped.region, "global");
    // Registering again keeps the row.
    rules.register_ip("10.0.0.10").await.unwrap();
    assert!(rules.tool_for_ip("10.0.0.10").await.unwrap().is_none());
}
