//! New down handler: already-linked fast path, dedup, parent suppression,
//! then the ticket wait window.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{
    EventDoc, EventRecord, EventStatus, EventType, ResolvingAction, EVENT_INDEX_PATTERN,
};
use crate::domain::ports::{SearchQuery, SearchRequest, SortOrder, StoredDocument, TaskKind};
use crate::services::context::CorrelatorContext;

use super::{load_doc, now_ts, with_active_statuses};

/// Dedup only runs while the record is young; past this many retries an
/// unlinked duplicate proceeds to parent lookup and ticketing.
const DEDUP_RETRY_LIMIT: u32 = 3;

pub async fn run(ctx: &CorrelatorContext, record: &mut EventRecord) -> DomainResult<()> {
    let Some((_, doc)) = load_doc(ctx, record, TaskKind::NewDownEvent).await? else {
        return Ok(());
    };

    // Already linked: some earlier pass matched an up event.
    if doc.linked_event().is_some() {
        debug!(doc_id = %record.doc_id, "moving linked down event to resolving");
        let update = json!({
            field::EVENT_STATUS: EventStatus::Resolving.as_str(),
            field::RESOLVING_ACTION: ResolvingAction::New.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Move Linked Down Event to Resolving [Task: NewDownEvent]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, reason = %e, "failed to move linked down event to resolving");
            return Ok(());
        }
        record.status = EventStatus::Resolving;
        record.retry_count = 0;
        ctx.records.update(record).await?;
        info!(doc_id = %record.doc_id, "moved linked down event to resolving");
        return Ok(());
    }

    // Duplicate of an earlier active down?
    if record.retry_count < DEDUP_RETRY_LIMIT {
        if let Some(initial) = find_initial_down(ctx, record, &doc).await? {
            debug!(doc_id = %record.doc_id, initial_id = %initial.id, "linking initial and deduping down event");
            let update = json!({
                field::INITIAL_EVENT: initial.id,
                field::INITIAL_EVENT_INDEX: initial.index,
                field::EVENT_STATUS: EventStatus::Deduped.as_str(),
                field::LAST_UPDATE_TS: now_ts(),
            });
            if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
                ctx.errors
                    .report(record, &format!("Failed to Link Initial and Dedup Down Event [{}][Task: NewDownEvent]. Reason: {e}", initial.id))
                    .await?;
                error!(doc_id = %record.doc_id, initial_id = %initial.id, reason = %e,
                       "failed to link initial and dedup down event");
                return Ok(());
            }
            record.status = EventStatus::Deduped;
            ctx.records.update(record).await?;
            info!(doc_id = %record.doc_id, initial_id = %initial.id, "linked initial and deduped down event");
            return Ok(());
        }
    }

    // Parent lookup, when the rule wants it and the asset has a parent.
    let rule = ctx.rules.effective_for(record).await?;
    let mut parent_down: Option<StoredDocument> = None;
    if rule.parent_child_lookup_required {
        if let Some(parent_asset) = doc
            .parent_asset_unique_id
            .as_deref()
            .filter(|p| !p.is_empty())
        {
            debug!(doc_id = %record.doc_id, parent_asset, "finding active parent down event");
            let mut query = SearchQuery::new()
                .must_not_exists(field::LINKED_EVENT)
                .must_term(field::EVENT_TYPE, EventType::Down.as_str());
            if let Some(tool_name) = doc.monitor_tool_name.as_deref() {
                query = query.must_term(field::TOOL_NAME, tool_name);
            }
            if let Some(title) = doc.event_title.as_deref() {
                query = query.must_term(field::EVENT_TITLE, title);
            }
            query = query.must_term_case_insensitive(field::ASSET_UNIQUE_ID, parent_asset);
            let request = SearchRequest::new(EVENT_INDEX_PATTERN, with_active_statuses(query))
                .sort(field::EVENT_TS, SortOrder::Asc);

            parent_down = match ctx.store.search(request).await {
                Ok(response) => response.into_first(),
                Err(e) => {
                    ctx.errors
                        .report(record, &format!("Failed to Find Parent Down Event [Task: NewDownEvent]. Reason: {e}"))
                        .await?;
                    return Ok(());
                }
            };
        }
    }

    if let Some(parent) = parent_down {
        debug!(doc_id = %record.doc_id, parent_id = %parent.id, "found active parent down event");
        let parent_ticket = parent.event()?.itsm_ticket;
        let mut update = json!({
            field::PARENT_EVENT: parent.id,
            field::PARENT_EVENT_INDEX: parent.index,
            field::EVENT_STATUS: EventStatus::Suppressed.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
        });
        // Inherit the parent's ticket when it already has one.
        if let Some(ticket) = parent_ticket {
            update[field::ITSM_TICKET] = json!(ticket);
        }

        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Link Parent and Suppress Down Event [{}][Task: NewDownEvent]. Reason: {e}", parent.id))
                .await?;
            error!(doc_id = %record.doc_id, parent_id = %parent.id, reason = %e,
                   "failed to link parent and suppress down event");
            return Ok(());
        }
        record.status = EventStatus::Suppressed;
        if let Some(ticket) = parent_ticket {
            record.extras.ticket_id = Some(ticket);
        }
        record.retry_count = 0;
        ctx.records.update(record).await?;
        info!(doc_id = %record.doc_id, parent_id = %parent.id, "linked parent and suppressed down event");
        return Ok(());
    }

    // No parent: wait out the ticket delay, then move to creating_ticket.
    let age_seconds = (Utc::now() - record.event_ts).num_seconds();
    if age_seconds > i64::from(rule.wait_time_in_seconds) {
        debug!(doc_id = %record.doc_id, "moving down event to creating ticket");
        let update = json!({
            field::EVENT_STATUS: EventStatus::CreatingTicket.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Move Down Event to Creating Ticket [Task: NewDownEvent]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, reason = %e, "failed to move down event to creating ticket");
            return Ok(());
        }
        record.status = EventStatus::CreatingTicket;
        record.retry_count = 0;
        debug!(doc_id = %record.doc_id, "moved down event to creating ticket");
    } else {
        debug!(doc_id = %record.doc_id, "retry down event");
        record.retry_count += 1;
    }
    ctx.records.update(record).await?;

    Ok(())
}

/// The earliest active unlinked down event with the same (tool, title,
/// asset) keys and an event timestamp at or before this one - excluding the
/// event itself.
async fn find_initial_down(
    ctx: &CorrelatorContext,
    record: &mut EventRecord,
    doc: &EventDoc,
) -> DomainResult<Option<StoredDocument>> {
    debug!(doc_id = %record.doc_id, "finding active initial down event");
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
        .sort(field::EVENT_TS, SortOrder::Asc);

    let initial = match ctx.store.search(request).await {
        Ok(response) => response.into_first(),
        Err(e) => {
            ctx.errors
                .report(record, &format!("Failed to Find Initial Down Event [Task: NewDownEvent]. Reason: {e}"))
                .await?;
            return Ok(None);
        }
    };

    match initial {
        Some(initial) if initial.id != record.doc_id => {
            debug!(doc_id = %record.doc_id, initial_id = %initial.id, "found active initial down event");
            Ok(Some(initial))
        }
        _ => {
            debug!(doc_id = %record.doc_id, "could not find active initial down event");
            Ok(None)
        }
    }
}
