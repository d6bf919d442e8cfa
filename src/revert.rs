//! Roll live pages back to a stored backup lineage.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::apply::update_content;
use crate::context::SyncContext;
use crate::db::{self, NewSnapshot, SnapshotRow};
use crate::error::{SyncError, SyncResult};
use crate::model::{
    partition_outcomes, Credentials, PageFailure, PageOutcome, PageSkip, PageSuccess,
    PUBLISHED_STATE,
};
use crate::sheets::tab_origin;
use crate::tracker;

const AUDIT_TAB: &str = "Reverted Pages";

pub const AUDIT_HEADER: [&str; 9] = [
    "ID",
    "Page Type",
    "Name",
    "URL",
    "HTML Title",
    "Meta Description",
    "Slug",
    "State",
    "Body Content",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertReport {
    pub succeeded: Vec<PageSuccess>,
    pub failed: Vec<PageFailure>,
    /// Audit spreadsheet URL, empty when it could not be written.
    pub revert_sheet_url: String,
    /// Lineage recording the reverted pages, if any page was reverted.
    pub backup_id: Option<String>,
}

pub fn audit_title(now: DateTime<Utc>) -> String {
    format!("Smuves Revert {} UTC", now.format("%Y-%m-%d %H:%M:%S"))
}

pub fn audit_rows(rows: &[SnapshotRow]) -> Vec<Vec<String>> {
    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(AUDIT_HEADER.iter().map(|h| h.to_string()).collect());
    for row in rows {
        let cell = |v: &Option<String>| v.clone().unwrap_or_default();
        out.push(vec![
            row.hubspot_page_id.clone(),
            row.page_type.clone(),
            cell(&row.name),
            cell(&row.url),
            cell(&row.html_title),
            cell(&row.meta_description),
            cell(&row.slug),
            cell(&row.state),
            cell(&row.body_content),
        ]);
    }
    out
}

/// HubSpot update body restoring a snapshot's content fields. Fields the
/// snapshot never recorded are left untouched.
pub fn snapshot_payload(row: &SnapshotRow) -> Map<String, Value> {
    [
        ("name", &row.name),
        ("htmlTitle", &row.html_title),
        ("metaDescription", &row.meta_description),
        ("slug", &row.slug),
        ("body", &row.body_content),
    ]
    .into_iter()
    .filter_map(|(prop, value)| {
        value
            .as_ref()
            .map(|v| (prop.to_string(), Value::String(v.clone())))
    })
    .collect()
}

/// Restore every page recorded under `version_id`.
///
/// Steps run in order: load the lineage, write a best-effort audit sheet,
/// push each page, then snapshot the pages that were restored.
#[instrument(skip_all, fields(user_id = %user_id, version_id = %version_id))]
pub async fn revert_to_version(
    ctx: &SyncContext,
    user_id: &str,
    creds: &Credentials,
    version_id: &str,
) -> SyncResult<RevertReport> {
    let token = creds.hubspot()?;

    let rows = db::snapshot_rows_for_backup(&ctx.pool, user_id, version_id)
        .await
        .map_err(SyncError::Storage)?;
    if rows.is_empty() {
        return Err(SyncError::VersionNotFound(version_id.to_string()));
    }

    let revert_sheet_url = match write_audit_sheet(ctx, creds, &rows).await {
        Ok(url) => url,
        Err(err) => {
            warn!(error = %err, "revert audit sheet not written");
            String::new()
        }
    };

    let pending: Vec<_> = rows.iter().map(|row| revert_page(ctx, token, row)).collect();
    let outcomes: Vec<PageOutcome> = stream::iter(pending)
        .buffer_unordered(ctx.max_concurrency)
        .collect()
        .await;
    // skipped pages had nothing to restore and are reported in neither list
    let (succeeded, failed, _skipped) = partition_outcomes(outcomes);

    let backup_id = if succeeded.is_empty() {
        None
    } else {
        let restored: HashSet<&str> = succeeded.iter().map(|s| s.page_id.as_str()).collect();
        let snapshots: Vec<NewSnapshot> = rows
            .iter()
            .filter(|r| restored.contains(r.hubspot_page_id.as_str()))
            .map(NewSnapshot::from)
            .collect();
        let backup_id = Uuid::new_v4().to_string();
        match db::insert_snapshots(
            &ctx.pool,
            user_id,
            &backup_id,
            &tracker::backup_date(Utc::now()),
            &snapshots,
        )
        .await
        {
            Ok(_) => Some(backup_id),
            Err(err) => {
                error!(error = ?err, "failed to snapshot reverted pages");
                None
            }
        }
    };

    info!(
        succeeded = succeeded.len(),
        failed = failed.len(),
        "revert finished"
    );
    Ok(RevertReport {
        succeeded,
        failed,
        revert_sheet_url,
        backup_id,
    })
}

async fn write_audit_sheet(
    ctx: &SyncContext,
    creds: &Credentials,
    rows: &[SnapshotRow],
) -> SyncResult<String> {
    let token = creds.google()?;
    let created = ctx
        .call(
            "creating revert audit sheet",
            ctx.sheets
                .create_spreadsheet(token, &audit_title(Utc::now()), AUDIT_TAB),
        )
        .await?;
    ctx.call(
        "writing revert audit sheet",
        ctx.sheets.write_values(
            token,
            &created.spreadsheet_id,
            &tab_origin(AUDIT_TAB),
            &audit_rows(rows),
        ),
    )
    .await?;
    Ok(created.spreadsheet_url)
}

async fn revert_page(ctx: &SyncContext, token: &str, row: &SnapshotRow) -> PageOutcome {
    let page_id = row.hubspot_page_id.clone();
    let name = row.name.clone().unwrap_or_default();
    let failure = |error: String| {
        warn!(page_id = %row.hubspot_page_id, %error, "page not reverted");
        PageOutcome::Failed(PageFailure {
            page_id: row.hubspot_page_id.clone(),
            name: row.name.clone().unwrap_or_default(),
            error,
        })
    };

    let Some(page_type) = row.page_type() else {
        return failure(format!("unknown page type '{}'", row.page_type));
    };
    let published = row.state.as_deref() == Some(PUBLISHED_STATE);
    let payload = snapshot_payload(row);

    if payload.is_empty() && !published {
        info!(page_id = %page_id, "nothing to restore, skipping");
        return PageOutcome::Skipped(PageSkip {
            page_id,
            name,
            reason: "nothing recorded to restore".to_string(),
        });
    }

    if !payload.is_empty() {
        if let Err(error) = update_content(ctx, token, page_type, &page_id, payload).await {
            return failure(error);
        }
    }

    if published {
        let publish = ctx
            .call(
                &format!("publishing page {page_id}"),
                ctx.hubspot.publish_page(token, page_type, &page_id),
            )
            .await;
        if let Err(err) = publish {
            return failure(format!("publish failed: {err:#}"));
        }
    }

    PageOutcome::Succeeded(PageSuccess { page_id, name })
}
