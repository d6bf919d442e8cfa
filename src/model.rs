use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::SyncError;

/// HubSpot's `currentState` for a live page.
pub const PUBLISHED_STATE: &str = "PUBLISHED";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    #[default]
    SitePage,
    LandingPage,
}

impl PageType {
    pub const ALL: [PageType; 2] = [PageType::SitePage, PageType::LandingPage];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::SitePage => "site_page",
            PageType::LandingPage => "landing_page",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "site_page" => Some(PageType::SitePage),
            "landing_page" => Some(PageType::LandingPage),
            _ => None,
        }
    }

    /// Collection segment under `/cms/v3/pages/`.
    pub fn api_path(&self) -> &'static str {
        match self {
            PageType::SitePage => "site-pages",
            PageType::LandingPage => "landing-pages",
        }
    }
}

/// A live HubSpot page as this service sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub page_type: PageType,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub url: Option<String>,
    pub html_title: Option<String>,
    pub meta_description: Option<String>,
    pub state: Option<String>,
    pub body: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeType::Create),
            "update" => Some(ChangeType::Update),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::InProgress => "in_progress",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BackupStatus::Pending),
            "in_progress" => Some(BackupStatus::InProgress),
            "completed" => Some(BackupStatus::Completed),
            "failed" => Some(BackupStatus::Failed),
            _ => None,
        }
    }
}

/// A field-level delta waiting to be appended to the change history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChangeEntry {
    pub page_id: String,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: ChangeType,
}

/// Keys of a change-set's per-page `fields` map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeField {
    Name,
    Url,
    HtmlTitle,
    MetaDescription,
    Slug,
    BodyContent,
    /// Display-only companion of `BodyContent`; never written back.
    BodyContentDiff,
}

impl ChangeField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeField::Name => "name",
            ChangeField::Url => "url",
            ChangeField::HtmlTitle => "html_title",
            ChangeField::MetaDescription => "meta_description",
            ChangeField::Slug => "slug",
            ChangeField::BodyContent => "body_content",
            ChangeField::BodyContentDiff => "body_content_diff",
        }
    }

    /// Property name in a HubSpot page update, or `None` for fields HubSpot
    /// does not accept (`url` is derived from the domain and slug).
    pub fn hubspot_property(&self) -> Option<&'static str> {
        match self {
            ChangeField::Name => Some("name"),
            ChangeField::HtmlTitle => Some("htmlTitle"),
            ChangeField::MetaDescription => Some("metaDescription"),
            ChangeField::Slug => Some("slug"),
            ChangeField::BodyContent => Some("body"),
            ChangeField::Url | ChangeField::BodyContentDiff => None,
        }
    }
}

impl fmt::Display for ChangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1-based spreadsheet coordinates of a changed cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellLocation {
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange {
    pub old: String,
    pub new: String,
    pub location: CellLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    #[default]
    Modified,
}

/// One page's entry in a change-set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageChange {
    pub page_id: String,
    #[serde(default)]
    pub page_type: PageType,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ChangeKind,
    pub fields: BTreeMap<ChangeField, FieldChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageSuccess {
    pub page_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageFailure {
    pub page_id: String,
    pub name: String,
    pub error: String,
}

/// A page left alone because there was nothing HubSpot could accept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageSkip {
    pub page_id: String,
    pub name: String,
    pub reason: String,
}

/// Result of pushing a single page to HubSpot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Succeeded(PageSuccess),
    Failed(PageFailure),
    /// Nothing to write for this page.
    Skipped(PageSkip),
}

/// Splits outcomes into `(succeeded, failed, skipped)`.
pub fn partition_outcomes(
    outcomes: impl IntoIterator<Item = PageOutcome>,
) -> (Vec<PageSuccess>, Vec<PageFailure>, Vec<PageSkip>) {
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            PageOutcome::Succeeded(ok) => succeeded.push(ok),
            PageOutcome::Failed(err) => failed.push(err),
            PageOutcome::Skipped(skip) => skipped.push(skip),
        }
    }
    (succeeded, failed, skipped)
}

/// Opaque bearer credential. Never printed.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

/// Credentials supplied with every core operation. Refreshing them is the
/// caller's job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub hubspot_token: Option<BearerToken>,
    #[serde(default)]
    pub google_token: Option<BearerToken>,
}

impl Credentials {
    pub fn new(hubspot_token: Option<&str>, google_token: Option<&str>) -> Self {
        Self {
            hubspot_token: hubspot_token.map(BearerToken::new),
            google_token: google_token.map(BearerToken::new),
        }
    }

    pub fn hubspot(&self) -> Result<&str, SyncError> {
        non_empty(self.hubspot_token.as_ref()).ok_or(SyncError::MissingCredentials("HubSpot"))
    }

    pub fn google(&self) -> Result<&str, SyncError> {
        non_empty(self.google_token.as_ref()).ok_or(SyncError::MissingCredentials("Google"))
    }
}

fn non_empty(token: Option<&BearerToken>) -> Option<&str> {
    token.map(BearerToken::as_str).filter(|t| !t.trim().is_empty())
}

/// Where a spreadsheet mirror lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SheetLocation {
    pub spreadsheet_id: String,
    pub tab_name: String,
}
