//! The manual-resolve plant does not lock the event row, so it races with
//! the alerted poller. The intended semantics: however many alerted passes
//! run before or after the plant, manual wins on the pass that follows it.

mod helpers;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use conflux::domain::models::{EventStatus, ResolvingAction};

use helpers::{event_payload, TestHarness};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn manual_resolve_wins_on_the_next_pass(alerted_passes_before_plant in 0usize..4) {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async move {
            let h = TestHarness::new().await;
            h.configure_rule("10.0.0.1", "Net Watcher", "LINK DOWN", |rule| {
                rule.wait_time_in_seconds = 0;
                rule.do_not_create_ticket_flag = false;
            })
            .await;

            let t0 = Utc::now() - Duration::seconds(300);
            let log = h
                .post_event("10.0.0.1", event_payload("SRV01", "LINK DOWN", "down", t0))
                .await;
            let down = h.ingest_record(log.id, 5).await;
            h.run_until_status(down.id, EventStatus::Alerted, 10).await;
            let ticket_id = h.record(down.id).await.extras.ticket_id.unwrap();

            // Let the alerted poller spin an arbitrary number of times
            // before the operator's resolve arrives.
            h.run_tasks(alerted_passes_before_plant).await;
            prop_assert_eq!(h.record(down.id).await.status, EventStatus::Alerted);

            h.post_resolve(ticket_id).await;
            h.run_until_idle(20).await;

            let down = h.record(down.id).await;
            let doc = h.doc(&down).await;
            prop_assert_eq!(down.status, EventStatus::Resolved);
            prop_assert_eq!(doc.resolving_action, Some(ResolvingAction::Manual));
            prop_assert!(doc.manual_resolve_ts.is_some());
            // Manual resolution never closes the ticket.
            prop_assert_eq!(h.tickets.close_count(), 0);
            Ok(())
        })?;
    }
}
