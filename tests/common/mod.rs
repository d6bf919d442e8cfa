#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use smuves_sync::context::SyncContext;
use smuves_sync::db::{self, NewSnapshot, Pool};
use smuves_sync::hubspot::HubSpotService;
use smuves_sync::model::{Page, PageType};
use smuves_sync::sheets::model::CreatedSpreadsheet;
use smuves_sync::sheets::SheetsService;

pub const USER: &str = "user-1";
pub const HUBSPOT_TOKEN: &str = "hs-token";
pub const GOOGLE_TOKEN: &str = "g-token";
pub const SPREADSHEET: &str = "sheet-abc";

/// A single in-memory connection so every query sees the same database.
pub async fn setup_pool() -> Pool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn page(id: &str, page_type: PageType, name: &str, state: &str) -> Page {
    Page {
        id: id.to_string(),
        page_type,
        name: Some(name.to_string()),
        slug: Some(name.to_lowercase().replace(' ', "-")),
        url: Some(format!(
            "https://acme.test/{}",
            name.to_lowercase().replace(' ', "-")
        )),
        html_title: Some(format!("{name} | Acme")),
        meta_description: Some(format!("About {name}")),
        state: Some(state.to_string()),
        body: Some(format!("<p>{name} body text</p>")),
        updated_at: Some("2026-01-01T00:00:00Z".to_string()),
    }
}

/// Store `pages` as one backup lineage and return its id.
pub async fn seed_backup(pool: &Pool, backup_id: &str, pages: &[Page]) -> String {
    let rows: Vec<NewSnapshot> = pages.iter().map(NewSnapshot::from).collect();
    db::insert_snapshots(pool, USER, backup_id, "2026-01-01 00:00:00", &rows)
        .await
        .unwrap();
    backup_id.to_string()
}

pub async fn count_snapshots(pool: &Pool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn context(pool: Pool, hubspot: &FakeHubSpot, sheets: &FakeSheets) -> SyncContext {
    let mut ctx = SyncContext::new(pool, Arc::new(hubspot.clone()), Arc::new(sheets.clone()));
    ctx.call_timeout = Duration::from_secs(5);
    ctx.max_concurrency = 2;
    ctx
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCall {
    pub page_id: String,
    pub page_type: PageType,
    pub patch: Value,
}

/// Live CMS held in memory. Updates mutate the stored pages.
#[derive(Clone, Default)]
pub struct FakeHubSpot {
    pages: Arc<Mutex<Vec<Page>>>,
    updates: Arc<Mutex<Vec<UpdateCall>>>,
    publishes: Arc<Mutex<Vec<String>>>,
    failing_updates: Arc<Mutex<HashSet<String>>>,
    failing_publishes: Arc<Mutex<HashSet<String>>>,
    slow_updates: Arc<Mutex<HashMap<String, Duration>>>,
}

impl FakeHubSpot {
    pub fn with_pages(pages: Vec<Page>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(pages)),
            ..Default::default()
        }
    }

    pub async fn fail_update(&self, page_id: &str) {
        self.failing_updates.lock().await.insert(page_id.to_string());
    }

    pub async fn fail_publish(&self, page_id: &str) {
        self.failing_publishes.lock().await.insert(page_id.to_string());
    }

    pub async fn slow_update(&self, page_id: &str, delay: Duration) {
        self.slow_updates
            .lock()
            .await
            .insert(page_id.to_string(), delay);
    }

    pub async fn edit(&self, page_id: &str, f: impl FnOnce(&mut Page)) {
        let mut pages = self.pages.lock().await;
        if let Some(page) = pages.iter_mut().find(|p| p.id == page_id) {
            f(page);
        }
    }

    pub async fn page(&self, page_id: &str) -> Option<Page> {
        self.pages
            .lock()
            .await
            .iter()
            .find(|p| p.id == page_id)
            .cloned()
    }

    pub async fn updates(&self) -> Vec<UpdateCall> {
        self.updates.lock().await.clone()
    }

    pub async fn publishes(&self) -> Vec<String> {
        self.publishes.lock().await.clone()
    }
}

#[async_trait]
impl HubSpotService for FakeHubSpot {
    async fn list_pages(&self, _token: &str, page_type: PageType) -> Result<Vec<Page>> {
        Ok(self
            .pages
            .lock()
            .await
            .iter()
            .filter(|p| p.page_type == page_type)
            .cloned()
            .collect())
    }

    async fn get_page(&self, _token: &str, _page_type: PageType, page_id: &str) -> Result<Page> {
        self.page(page_id)
            .await
            .ok_or_else(|| anyhow!("hubspot error 404 Not Found: page {page_id}"))
    }

    async fn update_page(
        &self,
        _token: &str,
        page_type: PageType,
        page_id: &str,
        patch: &Value,
    ) -> Result<()> {
        let delay = self.slow_updates.lock().await.get(page_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.updates.lock().await.push(UpdateCall {
            page_id: page_id.to_string(),
            page_type,
            patch: patch.clone(),
        });
        if self.failing_updates.lock().await.contains(page_id) {
            return Err(anyhow!("hubspot error 400 Bad Request: invalid slug"));
        }

        let mut pages = self.pages.lock().await;
        let page = pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| anyhow!("hubspot error 404 Not Found"))?;
        let take = |key: &str| patch.get(key).and_then(Value::as_str).map(str::to_string);
        if let Some(v) = take("name") {
            page.name = Some(v);
        }
        if let Some(v) = take("htmlTitle") {
            page.html_title = Some(v);
        }
        if let Some(v) = take("metaDescription") {
            page.meta_description = Some(v);
        }
        if let Some(v) = take("slug") {
            page.slug = Some(v);
        }
        if let Some(v) = take("body") {
            page.body = Some(v);
        }
        page.updated_at = Some("2026-06-01T12:00:00Z".to_string());
        Ok(())
    }

    async fn publish_page(&self, _token: &str, _page_type: PageType, page_id: &str) -> Result<()> {
        if self.failing_publishes.lock().await.contains(page_id) {
            return Err(anyhow!("hubspot error 409 Conflict: draft locked"));
        }
        self.publishes.lock().await.push(page_id.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteCall {
    pub spreadsheet_id: String,
    pub range: String,
    pub rows: Vec<Vec<String>>,
}

/// Spreadsheets held in memory, addressed by tab name.
#[derive(Clone, Default)]
pub struct FakeSheets {
    tabs: Arc<Mutex<HashMap<String, Vec<Vec<String>>>>>,
    writes: Arc<Mutex<Vec<WriteCall>>>,
    added_tabs: Arc<Mutex<Vec<String>>>,
    created: Arc<Mutex<Vec<String>>>,
    fail_add_tab: Arc<Mutex<bool>>,
}

/// `'My Tab'!A1` -> `My Tab`.
fn tab_of(range: &str) -> String {
    let tab = range.split('!').next().unwrap_or(range);
    tab.trim_matches('\'').replace("''", "'")
}

impl FakeSheets {
    pub async fn set_tab(&self, tab: &str, rows: Vec<Vec<String>>) {
        self.tabs.lock().await.insert(tab.to_string(), rows);
    }

    pub async fn tab(&self, tab: &str) -> Option<Vec<Vec<String>>> {
        self.tabs.lock().await.get(tab).cloned()
    }

    pub async fn fail_add_tab(&self) {
        *self.fail_add_tab.lock().await = true;
    }

    pub async fn writes(&self) -> Vec<WriteCall> {
        self.writes.lock().await.clone()
    }

    pub async fn added_tabs(&self) -> Vec<String> {
        self.added_tabs.lock().await.clone()
    }

    pub async fn created(&self) -> Vec<String> {
        self.created.lock().await.clone()
    }
}

#[async_trait]
impl SheetsService for FakeSheets {
    async fn read_values(
        &self,
        _token: &str,
        _spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>> {
        self.tab(&tab_of(range))
            .await
            .ok_or_else(|| anyhow!("sheets error 400 Bad Request: unable to parse range {range}"))
    }

    async fn add_tab(&self, _token: &str, _spreadsheet_id: &str, title: &str) -> Result<()> {
        if *self.fail_add_tab.lock().await {
            return Err(anyhow!("sheets error 403 Forbidden"));
        }
        self.added_tabs.lock().await.push(title.to_string());
        self.tabs.lock().await.insert(title.to_string(), Vec::new());
        Ok(())
    }

    async fn write_values(
        &self,
        _token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<()> {
        self.writes.lock().await.push(WriteCall {
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            rows: rows.to_vec(),
        });
        self.tabs.lock().await.insert(tab_of(range), rows.to_vec());
        Ok(())
    }

    async fn create_spreadsheet(
        &self,
        _token: &str,
        title: &str,
        tab_title: &str,
    ) -> Result<CreatedSpreadsheet> {
        let mut created = self.created.lock().await;
        created.push(title.to_string());
        let id = format!("created-{}", created.len());
        self.tabs
            .lock()
            .await
            .insert(tab_title.to_string(), Vec::new());
        Ok(CreatedSpreadsheet {
            spreadsheet_url: format!("https://docs.google.com/spreadsheets/d/{id}/edit"),
            spreadsheet_id: id,
        })
    }
}
