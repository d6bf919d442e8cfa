//! Push reviewed spreadsheet edits to HubSpot, one page at a time.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::model::{
    partition_outcomes, ChangeField, Credentials, FieldChange, Page, PageChange, PageFailure,
    PageOutcome, PageSkip, PageSuccess, PageType,
};
use crate::tracker;

/// `changed_by` recorded for history written after a sync.
pub const SYNC_ACTOR: &str = "sync";

/// Reason given for a page whose only edits are to fields HubSpot derives.
pub const READ_ONLY_SKIP_REASON: &str =
    "no writable fields changed: url is derived from the domain and slug, edit the slug instead";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub succeeded: Vec<PageSuccess>,
    pub failed: Vec<PageFailure>,
    /// Pages with nothing HubSpot could accept. Not sent, not failed.
    pub skipped: Vec<PageSkip>,
    /// Lineage holding the post-sync snapshots, if one was written.
    pub snapshot_backup_id: Option<String>,
}

/// HubSpot update body for the changed fields of one page.
pub fn build_payload(fields: &BTreeMap<ChangeField, FieldChange>) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(field, change)| {
            field
                .hubspot_property()
                .map(|prop| (prop.to_string(), Value::String(change.new.clone())))
        })
        .collect()
}

/// Send a content update for one page, mapping the error to its per-page message.
pub(crate) async fn update_content(
    ctx: &SyncContext,
    token: &str,
    page_type: PageType,
    page_id: &str,
    payload: Map<String, Value>,
) -> Result<(), String> {
    let body = Value::Object(payload);
    ctx.call(
        &format!("updating page {page_id}"),
        ctx.hubspot.update_page(token, page_type, page_id, &body),
    )
    .await
    .map_err(|err| format!("content update failed: {err:#}"))
}

/// Apply a reviewed change-set. Pages are independent: one page failing
/// never stops the others.
#[instrument(skip_all, fields(user_id = %user_id, pages = changes.len()))]
pub async fn apply_changes(
    ctx: &SyncContext,
    user_id: &str,
    creds: &Credentials,
    changes: &[PageChange],
) -> SyncResult<ApplyReport> {
    let token = creds.hubspot()?;

    let pending: Vec<_> = changes
        .iter()
        .map(|change| apply_page(ctx, token, change))
        .collect();
    let outcomes: Vec<PageOutcome> = stream::iter(pending)
        .buffer_unordered(ctx.max_concurrency)
        .collect()
        .await;
    let (succeeded, failed, skipped) = partition_outcomes(outcomes);
    info!(
        succeeded = succeeded.len(),
        failed = failed.len(),
        skipped = skipped.len(),
        "change-set applied"
    );

    let snapshot_backup_id = if succeeded.is_empty() {
        None
    } else {
        match resnapshot(ctx, user_id, token, changes, &succeeded).await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "post-sync snapshot failed");
                None
            }
        }
    };

    Ok(ApplyReport {
        succeeded,
        failed,
        skipped,
        snapshot_backup_id,
    })
}

async fn apply_page(ctx: &SyncContext, token: &str, change: &PageChange) -> PageOutcome {
    let failure = |error: String| {
        warn!(page_id = %change.page_id, %error, "page not synced");
        PageOutcome::Failed(PageFailure {
            page_id: change.page_id.clone(),
            name: change.name.clone(),
            error,
        })
    };

    let payload = build_payload(&change.fields);
    if payload.is_empty() {
        info!(page_id = %change.page_id, "only read-only fields changed, skipping");
        return PageOutcome::Skipped(PageSkip {
            page_id: change.page_id.clone(),
            name: change.name.clone(),
            reason: READ_ONLY_SKIP_REASON.to_string(),
        });
    }

    match update_content(ctx, token, change.page_type, &change.page_id, payload).await {
        Ok(()) => PageOutcome::Succeeded(PageSuccess {
            page_id: change.page_id.clone(),
            name: change.name.clone(),
        }),
        Err(error) => failure(error),
    }
}

/// Re-read the synced pages and store a new generation so the next detection
/// compares synced pages against what HubSpot now holds and every other page
/// against its previous baseline.
async fn resnapshot(
    ctx: &SyncContext,
    user_id: &str,
    token: &str,
    changes: &[PageChange],
    succeeded: &[PageSuccess],
) -> SyncResult<Option<String>> {
    let targets: Vec<&PageChange> = changes
        .iter()
        .filter(|c| succeeded.iter().any(|s| s.page_id == c.page_id))
        .collect();

    let reads: Vec<_> = targets
        .into_iter()
        .map(|change| {
            ctx.call(
                "re-reading synced page",
                ctx.hubspot.get_page(token, change.page_type, &change.page_id),
            )
        })
        .collect();
    let fetched: Vec<SyncResult<Page>> = stream::iter(reads)
        .buffer_unordered(ctx.max_concurrency)
        .collect()
        .await;

    let mut pages = Vec::with_capacity(fetched.len());
    for res in fetched {
        match res {
            Ok(page) => pages.push(page),
            Err(err) => warn!(error = %err, "skipping page in post-sync snapshot"),
        }
    }
    if pages.is_empty() {
        return Ok(None);
    }
    tracker::snapshot_synced_pages(ctx, user_id, SYNC_ACTOR, pages)
        .await
        .map(Some)
}
