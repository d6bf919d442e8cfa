//! Spreadsheet vs. latest snapshot comparison.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::context::SyncContext;
use crate::db::{self, SnapshotRow};
use crate::diff;
use crate::error::{SyncError, SyncResult};
use crate::mirror::{Column, MirrorTable};
use crate::model::{
    CellLocation, ChangeField, ChangeKind, Credentials, FieldChange, PageChange, SheetLocation,
};
use crate::sheets::quote_tab;

pub const NO_BASELINE_MESSAGE: &str =
    "No database backup found for this user. Run a backup before detecting changes.";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectOutcome {
    pub changes: Vec<PageChange>,
    /// Lineage the sheet was compared against; `None` when the user has no
    /// snapshots yet.
    pub baseline_backup_id: Option<String>,
}

impl DetectOutcome {
    pub fn message(&self) -> Option<&'static str> {
        self.baseline_backup_id
            .is_none()
            .then_some(NO_BASELINE_MESSAGE)
    }
}

/// Read the mirror tab and diff it against the user's latest backup.
#[instrument(skip_all, fields(user_id = %user_id, tab = %location.tab_name))]
pub async fn detect_changes(
    ctx: &SyncContext,
    user_id: &str,
    creds: &Credentials,
    location: &SheetLocation,
) -> SyncResult<DetectOutcome> {
    let token = creds.google()?;

    let values = ctx
        .call(
            "reading spreadsheet",
            ctx.sheets.read_values(
                token,
                &location.spreadsheet_id,
                &quote_tab(&location.tab_name),
            ),
        )
        .await?;
    let table = MirrorTable::parse(&values)?;

    let Some(backup_id) = db::latest_backup_id(&ctx.pool, user_id)
        .await
        .map_err(SyncError::Storage)?
    else {
        info!("no baseline backup, nothing to compare");
        return Ok(DetectOutcome::default());
    };

    let mut snapshots = db::snapshot_rows_for_backup(&ctx.pool, user_id, &backup_id)
        .await
        .map_err(SyncError::Storage)?;

    // Backups only store pages that changed, so a sheet row can be missing
    // from the latest lineage while its page still has an older snapshot.
    let in_lineage: HashSet<String> = snapshots
        .iter()
        .map(|s| s.hubspot_page_id.clone())
        .collect();
    for row in table.rows() {
        if in_lineage.contains(&row.page_id) {
            continue;
        }
        if let Some(older) = db::latest_snapshot_for_page(&ctx.pool, user_id, &row.page_id)
            .await
            .map_err(SyncError::Storage)?
        {
            debug!(page_id = %row.page_id, backup_id = %older.backup_id, "using older snapshot");
            snapshots.push(older);
        }
    }
    let changes = compute_changes(&table, &snapshots);
    info!(
        backup_id = %backup_id,
        rows = table.len(),
        changed = changes.len(),
        "change detection finished"
    );

    Ok(DetectOutcome {
        changes,
        baseline_backup_id: Some(backup_id),
    })
}

/// Diff every mirrored row against its snapshot, in sheet order.
///
/// Only pages with at least one differing field are returned. Rows whose id
/// has no snapshot are skipped.
pub fn compute_changes(table: &MirrorTable, snapshots: &[SnapshotRow]) -> Vec<PageChange> {
    let by_id: HashMap<&str, &SnapshotRow> = snapshots
        .iter()
        .map(|s| (s.hubspot_page_id.as_str(), s))
        .collect();

    let mut changes = Vec::new();
    for row in table.rows() {
        let Some(snapshot) = by_id.get(row.page_id.as_str()) else {
            debug!(page_id = %row.page_id, "row has no snapshot, skipping");
            continue;
        };

        let mut fields = BTreeMap::new();
        for column in Column::ALL {
            let (Some(field), Some(column_number)) = (column.field(), table.column_number(column))
            else {
                continue;
            };
            let new = row.get(column).unwrap_or_default();
            let old = snapshot_value(snapshot, column);
            if old == new {
                continue;
            }

            let location = CellLocation {
                row: row.row_number,
                column: column_number,
            };
            fields.insert(
                field,
                FieldChange {
                    old: old.to_string(),
                    new: new.to_string(),
                    location,
                    diff: None,
                },
            );
            if field == ChangeField::BodyContent {
                fields.insert(
                    ChangeField::BodyContentDiff,
                    FieldChange {
                        old: old.to_string(),
                        new: new.to_string(),
                        location,
                        diff: Some(diff::render_html(old, new)),
                    },
                );
            }
        }

        if fields.is_empty() {
            continue;
        }
        let name = row
            .get(Column::Name)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| snapshot.name.clone())
            .unwrap_or_default();
        changes.push(PageChange {
            page_id: row.page_id.clone(),
            page_type: snapshot.page_type().unwrap_or_default(),
            name,
            kind: ChangeKind::Modified,
            fields,
        });
    }
    changes
}

fn snapshot_value(snapshot: &SnapshotRow, column: Column) -> &str {
    let value = match column {
        Column::Id => Some(&snapshot.hubspot_page_id),
        Column::Name => snapshot.name.as_ref(),
        Column::Url => snapshot.url.as_ref(),
        Column::HtmlTitle => snapshot.html_title.as_ref(),
        Column::MetaDescription => snapshot.meta_description.as_ref(),
        Column::Slug => snapshot.slug.as_ref(),
        Column::BodyContent => snapshot.body_content.as_ref(),
    };
    value.map(String::as_str).unwrap_or_default()
}
