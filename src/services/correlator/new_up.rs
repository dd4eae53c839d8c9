//! New up handler: link the up event to its latest active down and resolve.

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{EventRecord, EventStatus, EventType, EVENT_INDEX_PATTERN};
use crate::domain::ports::{BulkUpdate, SearchQuery, SearchRequest, SortOrder, TaskKind};
use crate::services::context::CorrelatorContext;

use super::{load_doc, now_ts, with_active_statuses};

pub async fn run(ctx: &CorrelatorContext, record: &mut EventRecord) -> DomainResult<()> {
    let Some((_, doc)) = load_doc(ctx, record, TaskKind::NewUpEvent).await? else {
        return Ok(());
    };

    debug!(doc_id = %record.doc_id, "finding active down event");
    let mut query = SearchQuery::new()
        .must_not_exists(field::LINKED_EVENT)
        .must_term(field::EVENT_TYPE, EventType::Down.as_str());
    if let Some(event_ts) = doc.event_ts {
        query = query.must_range_lte(field::EVENT_TS, &event_ts.to_rfc3339());
    }
    if let Some(tool_name) = doc.monitor_tool_name.as_deref() {
        query = query.must_term(field::TOOL_NAME, tool_name);
    }
    if let Some(title) = doc.event_title.as_deref() {
        query = query.must_term(field::EVENT_TITLE, title);
    }
    if let Some(asset) = doc.asset_unique_id.as_deref() {
        query = query.must_term_case_insensitive(field::ASSET_UNIQUE_ID, asset);
    }
    let request = SearchRequest::new(EVENT_INDEX_PATTERN, with_active_statuses(query))
        .sort(field::EVENT_TS, SortOrder::Desc)
        .size(1000);

    let down_events = match ctx.store.search(request).await {
        Ok(response) => response.into_hits(),
        Err(e) => {
            ctx.errors
                .report(record, &format!("Failed to Find Down Event [Task: NewUpEvent]. Reason: {e}"))
                .await?;
            return Ok(());
        }
    };

    if let Some(latest_down) = down_events.first() {
        // Link up and down both ways; the up event is resolved on the spot.
        debug!(doc_id = %record.doc_id, down_id = %latest_down.id, "found active down event");
        let update_ts = now_ts();
        let down_update = json!({
            field::LINKED_EVENT: record.doc_id,
            field::LINKED_EVENT_INDEX: record.doc_index,
            field::LAST_UPDATE_TS: update_ts,
        });
        let up_update = json!({
            field::LINKED_EVENT: latest_down.id,
            field::LINKED_EVENT_INDEX: latest_down.index,
            field::EVENT_STATUS: EventStatus::Resolved.as_str(),
            field::LAST_UPDATE_TS: update_ts,
        });

        // The up event first, then the latest down.
        let linked = async {
            ctx.store.update(&record.doc_index, &record.doc_id, &up_update).await?;
            ctx.store.update(&latest_down.index, &latest_down.id, &down_update).await
        }
        .await;
        if let Err(e) = linked {
            ctx.errors
                .report(record, &format!("Failed to Link Event [Task: NewUpEvent]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, down_id = %latest_down.id, reason = %e,
                   "failed to link event");
            return Ok(());
        }

        // Back-link any older unlinked matches, best effort.
        let operations: Vec<BulkUpdate> = down_events
            .iter()
            .skip(1)
            .map(|hit| BulkUpdate {
                index: hit.index.clone(),
                id: hit.id.clone(),
                doc: down_update.clone(),
            })
            .collect();
        if !operations.is_empty() {
            if let Err(e) = ctx.store.bulk_update(&operations).await {
                ctx.errors
                    .report_with(
                        record,
                        &format!("Failed to Link Additional Events [Task: NewUpEvent]. Reason: {e}"),
                        false,
                        false,
                    )
                    .await?;
                warn!(doc_id = %record.doc_id, down_id = %latest_down.id, reason = %e,
                      "failed to link additional events");
            }
        }

        record.status = EventStatus::Resolved;
        ctx.records.update(record).await?;
        info!(doc_id = %record.doc_id, down_id = %latest_down.id, "linked and resolved up event");
    } else if record.retry_count > 0 {
        // Second pass without a match: the down never arrived.
        warn!(doc_id = %record.doc_id, "failed to find active down event");
        let update = json!({
            field::EVENT_STATUS: EventStatus::Error.as_str(),
            field::ERROR_REASON: "Missing Down Event",
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Un-Resolve Up Event [Task: NewUpEvent]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, reason = %e, "failed to un-resolve up event");
            return Ok(());
        }
        record.status = EventStatus::Error;
        ctx.records.update(record).await?;
        debug!(doc_id = %record.doc_id, "up event moved to error");
    } else {
        // First pass: give a late down one more window to show up.
        debug!(doc_id = %record.doc_id, "retry up event");
        record.retry_count += 1;
        ctx.records.update(record).await?;
    }

    Ok(())
}
