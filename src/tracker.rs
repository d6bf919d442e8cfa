//! Auto-backup: snapshot the pages that changed since their last snapshot,
//! mirror them to a fresh spreadsheet tab and log what changed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::context::SyncContext;
use crate::db::{self, HistoryAuthor, NewSnapshot, SnapshotRow};
use crate::error::{SyncError, SyncResult};
use crate::mirror;
use crate::model::{ChangeType, Credentials, NewChangeEntry, Page, PageType};
use crate::sheets::tab_origin;

/// `changed_by` recorded for history written by scheduled backups.
pub const AUTO_BACKUP_ACTOR: &str = "auto_backup";

const BACKUP_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn backup_date(now: DateTime<Utc>) -> String {
    now.format(BACKUP_DATE_FORMAT).to_string()
}

pub fn backup_tab_name(now: DateTime<Utc>) -> String {
    format!("Backup {}", now.format("%Y-%m-%d %H-%M-%S"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReport {
    pub backup_session_id: i64,
    /// Lineage holding this run's snapshots; `None` when nothing changed.
    pub backup_id: Option<String>,
    pub pages_backed_up: usize,
    pub changes_detected: usize,
    /// Tab written for this run; `None` when nothing changed.
    pub tab_name: Option<String>,
    pub message: String,
}

/// A live page and the history entries it produced against its latest snapshot.
#[derive(Debug, Clone)]
pub struct TrackedPage {
    pub page: Page,
    pub entries: Vec<NewChangeEntry>,
}

impl TrackedPage {
    pub fn changed(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// Field-level differences between a live page and its latest snapshot.
///
/// A page without a snapshot yields a single `create` entry.
pub fn compare_page(page: &Page, previous: Option<&SnapshotRow>) -> Vec<NewChangeEntry> {
    let Some(previous) = previous else {
        return vec![NewChangeEntry {
            page_id: page.id.clone(),
            field_name: "page".to_string(),
            old_value: None,
            new_value: Some(page.name.clone().unwrap_or_else(|| page.id.clone())),
            change_type: ChangeType::Create,
        }];
    };

    let tracked = [
        ("name", &page.name, &previous.name),
        ("slug", &page.slug, &previous.slug),
        ("url", &page.url, &previous.url),
        ("status", &page.state, &previous.state),
        ("updated_at", &page.updated_at, &previous.page_updated_at),
    ];
    tracked
        .into_iter()
        .filter(|(_, live, recorded)| live != recorded)
        .map(|(field, live, recorded)| NewChangeEntry {
            page_id: page.id.clone(),
            field_name: field.to_string(),
            old_value: recorded.clone(),
            new_value: live.clone(),
            change_type: ChangeType::Update,
        })
        .collect()
}

/// Compare each page against its own most recent snapshot.
#[instrument(skip_all, fields(pages = pages.len()))]
pub async fn track_pages(
    ctx: &SyncContext,
    user_id: &str,
    pages: Vec<Page>,
) -> SyncResult<Vec<TrackedPage>> {
    let mut tracked = Vec::with_capacity(pages.len());
    for page in pages {
        let previous = db::latest_snapshot_for_page(&ctx.pool, user_id, &page.id)
            .await
            .map_err(SyncError::Storage)?;
        let entries = compare_page(&page, previous.as_ref());
        debug!(page_id = %page.id, changes = entries.len(), "compared page");
        tracked.push(TrackedPage { page, entries });
    }
    Ok(tracked)
}

/// Store snapshots and history for the changed pages under `backup_id`, in
/// one transaction. Returns the number of pages recorded.
#[instrument(skip_all, fields(backup_id = %backup_id))]
pub async fn record_changes(
    ctx: &SyncContext,
    user_id: &str,
    author: HistoryAuthor<'_>,
    backup_id: &str,
    backup_date: &str,
    tracked: &[TrackedPage],
) -> SyncResult<usize> {
    let changed: Vec<&TrackedPage> = tracked.iter().filter(|t| t.changed()).collect();
    if changed.is_empty() {
        return Ok(0);
    }

    let snapshots: Vec<NewSnapshot> = changed.iter().map(|t| NewSnapshot::from(&t.page)).collect();
    let entries: Vec<NewChangeEntry> = changed
        .iter()
        .flat_map(|t| t.entries.iter().cloned())
        .collect();
    db::insert_snapshots_with_history(
        &ctx.pool,
        user_id,
        backup_id,
        backup_date,
        &snapshots,
        author,
        &entries,
    )
    .await
    .map_err(SyncError::Storage)?;

    Ok(changed.len())
}

/// Write a new full generation after a sync.
///
/// `pages` are the freshly read synced pages. Every other page of the
/// current latest lineage is carried over unchanged, so pages that failed or
/// were left alone keep their baseline for the next detection. History
/// entries are recorded for the synced pages that differ from their latest
/// snapshot. Returns the new `backup_id`.
#[instrument(skip_all, fields(user_id = %user_id, pages = pages.len()))]
pub async fn snapshot_synced_pages(
    ctx: &SyncContext,
    user_id: &str,
    changed_by: &str,
    pages: Vec<Page>,
) -> SyncResult<String> {
    let tracked = track_pages(ctx, user_id, pages).await?;

    let baseline = match db::latest_backup_id(&ctx.pool, user_id)
        .await
        .map_err(SyncError::Storage)?
    {
        Some(id) => db::snapshot_rows_for_backup(&ctx.pool, user_id, &id)
            .await
            .map_err(SyncError::Storage)?,
        None => Vec::new(),
    };

    let refreshed: HashSet<&str> = tracked.iter().map(|t| t.page.id.as_str()).collect();
    let mut snapshots: Vec<NewSnapshot> = baseline
        .iter()
        .filter(|row| !refreshed.contains(row.hubspot_page_id.as_str()))
        .map(NewSnapshot::from)
        .collect();
    let carried = snapshots.len();
    snapshots.extend(tracked.iter().map(|t| NewSnapshot::from(&t.page)));
    let entries: Vec<NewChangeEntry> = tracked
        .iter()
        .flat_map(|t| t.entries.iter().cloned())
        .collect();

    let backup_id = Uuid::new_v4().to_string();
    let author = HistoryAuthor {
        changed_by,
        backup_session_id: None,
    };
    db::insert_snapshots_with_history(
        &ctx.pool,
        user_id,
        &backup_id,
        &backup_date(Utc::now()),
        &snapshots,
        author,
        &entries,
    )
    .await
    .map_err(SyncError::Storage)?;

    debug!(%backup_id, carried, refreshed = tracked.len(), "post-sync generation stored");
    Ok(backup_id)
}

/// One auto-backup run for `user_id`, tracked by a backup session.
///
/// Any failure after the session is created marks it failed before the error
/// is returned.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn run_backup(
    ctx: &SyncContext,
    user_id: &str,
    creds: &Credentials,
    spreadsheet_id: &str,
) -> SyncResult<BackupReport> {
    let hubspot_token = creds.hubspot()?;
    let google_token = creds.google()?;

    let now = Utc::now();
    let run = BackupRun {
        user_id,
        hubspot_token,
        google_token,
        spreadsheet_id,
        tab_name: backup_tab_name(now),
        backup_date: backup_date(now),
        backup_id: Uuid::new_v4().to_string(),
    };
    let session_id =
        db::create_backup_session(&ctx.pool, user_id, spreadsheet_id, &run.tab_name, &run.backup_date)
            .await
            .map_err(SyncError::Storage)?;

    match run.execute(ctx, session_id).await {
        Ok(report) => Ok(report),
        Err(err) => {
            warn!(session_id, error = %err, "backup failed");
            if let Err(mark_err) =
                db::fail_backup_session(&ctx.pool, session_id, &format!("{err:#}")).await
            {
                error!(session_id, error = ?mark_err, "failed to mark backup session failed");
            }
            Err(err)
        }
    }
}

struct BackupRun<'a> {
    user_id: &'a str,
    hubspot_token: &'a str,
    google_token: &'a str,
    spreadsheet_id: &'a str,
    tab_name: String,
    backup_date: String,
    backup_id: String,
}

impl BackupRun<'_> {
    async fn execute(&self, ctx: &SyncContext, session_id: i64) -> SyncResult<BackupReport> {
        db::mark_backup_in_progress(&ctx.pool, session_id)
            .await
            .map_err(SyncError::Storage)?;

        let mut pages = Vec::new();
        for page_type in PageType::ALL {
            let listed = ctx
                .call(
                    &format!("listing {}s", page_type.as_str()),
                    ctx.hubspot.list_pages(self.hubspot_token, page_type),
                )
                .await?;
            pages.extend(listed);
        }
        let pages_backed_up = pages.len();

        let tracked = track_pages(ctx, self.user_id, pages).await?;
        let changed: Vec<&TrackedPage> = tracked.iter().filter(|t| t.changed()).collect();

        if changed.is_empty() {
            db::complete_backup_session(&ctx.pool, session_id, pages_backed_up as i64, 0)
                .await
                .map_err(SyncError::Storage)?;
            info!(session_id, pages = pages_backed_up, "backup finished, nothing changed");
            return Ok(BackupReport {
                backup_session_id: session_id,
                backup_id: None,
                pages_backed_up,
                changes_detected: 0,
                tab_name: None,
                message: "No changes since the last backup.".to_string(),
            });
        }

        let mut rows = Vec::with_capacity(changed.len() + 1);
        rows.push(mirror::header_row());
        rows.extend(changed.iter().map(|t| mirror::page_row(&t.page)));

        ctx.call(
            "creating backup tab",
            ctx.sheets
                .add_tab(self.google_token, self.spreadsheet_id, &self.tab_name),
        )
        .await?;
        ctx.call(
            "writing backup tab",
            ctx.sheets.write_values(
                self.google_token,
                self.spreadsheet_id,
                &tab_origin(&self.tab_name),
                &rows,
            ),
        )
        .await?;

        let author = HistoryAuthor {
            changed_by: AUTO_BACKUP_ACTOR,
            backup_session_id: Some(session_id),
        };
        let changes_detected = record_changes(
            ctx,
            self.user_id,
            author,
            &self.backup_id,
            &self.backup_date,
            &tracked,
        )
        .await?;

        db::complete_backup_session(
            &ctx.pool,
            session_id,
            pages_backed_up as i64,
            changes_detected as i64,
        )
        .await
        .map_err(SyncError::Storage)?;

        info!(
            session_id,
            backup_id = %self.backup_id,
            pages = pages_backed_up,
            changed = changes_detected,
            "backup finished"
        );
        Ok(BackupReport {
            backup_session_id: session_id,
            backup_id: Some(self.backup_id.clone()),
            pages_backed_up,
            changes_detected,
            tab_name: Some(self.tab_name.clone()),
            message: format!(
                "Backed up {} changed page(s) to tab '{}'.",
                changes_detected, self.tab_name
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn page(id: &str, state: &str) -> Page {
        Page {
            id: id.into(),
            name: Some(format!("Page {id}")),
            slug: Some(id.to_lowercase()),
            url: Some(format!("https://acme.test/{}", id.to_lowercase())),
            state: Some(state.into()),
            updated_at: Some("2026-03-01T10:00:00Z".into()),
            ..Default::default()
        }
    }

    fn row_for(page: &Page) -> SnapshotRow {
        let s = NewSnapshot::from(page);
        SnapshotRow {
            id: 7,
            user_id: "u1".into(),
            backup_id: "b0".into(),
            hubspot_page_id: s.hubspot_page_id,
            page_type: s.page_type,
            name: s.name,
            url: s.url,
            html_title: s.html_title,
            meta_description: s.meta_description,
            slug: s.slug,
            body_content: s.body_content,
            state: s.state,
            page_updated_at: s.page_updated_at,
            backup_date: "2026-03-01 10:00:00".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn new_page_yields_single_create_entry() {
        let entries = compare_page(&page("P1", "DRAFT"), None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].change_type, ChangeType::Create);
        assert_eq!(entries[0].new_value.as_deref(), Some("Page P1"));
        assert!(entries[0].old_value.is_none());
    }

    #[test]
    fn unchanged_page_yields_nothing() {
        let live = page("P1", "PUBLISHED");
        assert!(compare_page(&live, Some(&row_for(&live))).is_empty());
    }

    #[test]
    fn each_differing_field_gets_an_update_entry() {
        let before = page("P2", "DRAFT");
        let mut live = before.clone();
        live.state = Some("PUBLISHED".into());
        live.updated_at = Some("2026-03-02T09:00:00Z".into());
        // body and title are not tracked here
        live.body = Some("<p>new</p>".into());
        live.html_title = Some("New title".into());

        let entries = compare_page(&live, Some(&row_for(&before)));
        let fields: Vec<&str> = entries.iter().map(|e| e.field_name.as_str()).collect();
        assert_eq!(fields, vec!["status", "updated_at"]);
        assert!(entries.iter().all(|e| e.change_type == ChangeType::Update));
        assert_eq!(entries[0].old_value.as_deref(), Some("DRAFT"));
        assert_eq!(entries[0].new_value.as_deref(), Some("PUBLISHED"));
    }

    #[test]
    fn tab_name_and_backup_date_formats() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap();
        assert_eq!(backup_tab_name(now), "Backup 2026-05-04 03-02-01");
        assert_eq!(backup_date(now), "2026-05-04 03:02:01");
    }
}
