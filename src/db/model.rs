//! Database entity and view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{BackupStatus, ChangeType, Page, PageType};

/// One persisted page snapshot. Rows sharing a `backup_id` form one backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    pub id: i64,
    pub user_id: String,
    pub backup_id: String,
    pub hubspot_page_id: String,
    pub page_type: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub html_title: Option<String>,
    pub meta_description: Option<String>,
    pub slug: Option<String>,
    pub body_content: Option<String>,
    pub state: Option<String>,
    pub page_updated_at: Option<String>,
    pub backup_date: String,
    pub created_at: DateTime<Utc>,
}

impl SnapshotRow {
    pub fn page_type(&self) -> Option<PageType> {
        PageType::parse(&self.page_type)
    }
}

/// Snapshot values to insert; the store assigns id, lineage and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    pub hubspot_page_id: String,
    pub page_type: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub html_title: Option<String>,
    pub meta_description: Option<String>,
    pub slug: Option<String>,
    pub body_content: Option<String>,
    pub state: Option<String>,
    pub page_updated_at: Option<String>,
}

impl From<&Page> for NewSnapshot {
    fn from(page: &Page) -> Self {
        Self {
            hubspot_page_id: page.id.clone(),
            page_type: page.page_type.as_str().to_string(),
            name: page.name.clone(),
            url: page.url.clone(),
            html_title: page.html_title.clone(),
            meta_description: page.meta_description.clone(),
            slug: page.slug.clone(),
            body_content: page.body.clone(),
            state: page.state.clone(),
            page_updated_at: page.updated_at.clone(),
        }
    }
}

/// Copies the recorded values of an existing row; its primary key is dropped.
impl From<&SnapshotRow> for NewSnapshot {
    fn from(row: &SnapshotRow) -> Self {
        Self {
            hubspot_page_id: row.hubspot_page_id.clone(),
            page_type: row.page_type.clone(),
            name: row.name.clone(),
            url: row.url.clone(),
            html_title: row.html_title.clone(),
            meta_description: row.meta_description.clone(),
            slug: row.slug.clone(),
            body_content: row.body_content.clone(),
            state: row.state.clone(),
            page_updated_at: row.page_updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeHistoryEntry {
    pub id: i64,
    pub page_id: String,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: ChangeType,
    pub changed_by: String,
    pub backup_session_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSession {
    pub id: i64,
    pub user_id: String,
    pub sheet_id: String,
    pub tab_name: String,
    pub backup_date: String,
    pub status: BackupStatus,
    pub pages_backed_up: i64,
    pub changes_detected: i64,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One backup lineage as offered for revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub backup_id: String,
    pub backup_date: String,
    pub created_at: DateTime<Utc>,
    pub page_count: i64,
}
