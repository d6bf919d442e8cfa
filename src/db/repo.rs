use super::model::{BackupSession, ChangeHistoryEntry, NewSnapshot, SnapshotRow, VersionSummary};
use crate::model::{BackupStatus, ChangeType, NewChangeEntry};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

const SNAPSHOT_COLUMNS: &str = "id, user_id, backup_id, hubspot_page_id, page_type, name, url, \
     html_title, meta_description, slug, body_content, state, page_updated_at, backup_date, created_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// The user's most recent backup lineage, by creation time.
#[instrument(skip_all)]
pub async fn latest_backup_id(pool: &Pool, user_id: &str) -> Result<Option<String>> {
    let id = sqlx::query_scalar::<_, String>(
        "SELECT backup_id FROM snapshots WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to look up latest backup")?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn snapshot_rows_for_backup(
    pool: &Pool,
    user_id: &str,
    backup_id: &str,
) -> Result<Vec<SnapshotRow>> {
    let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE user_id = ? AND backup_id = ? ORDER BY id"
    ))
    .bind(user_id)
    .bind(backup_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load snapshot rows for backup {backup_id}"))?;
    Ok(rows)
}

/// Most recent snapshot of one page, regardless of lineage.
#[instrument(skip_all)]
pub async fn latest_snapshot_for_page(
    pool: &Pool,
    user_id: &str,
    page_id: &str,
) -> Result<Option<SnapshotRow>> {
    let row = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE user_id = ? AND hubspot_page_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT 1"
    ))
    .bind(user_id)
    .bind(page_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to load latest snapshot for page {page_id}"))?;
    Ok(row)
}

/// Insert one generation of snapshot rows atomically.
#[instrument(skip_all, fields(backup_id = %backup_id, rows = snapshots.len()))]
pub async fn insert_snapshots(
    pool: &Pool,
    user_id: &str,
    backup_id: &str,
    backup_date: &str,
    snapshots: &[NewSnapshot],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for snapshot in snapshots {
        insert_snapshot_tx(&mut tx, user_id, backup_id, backup_date, snapshot, now).await?;
    }
    tx.commit().await?;
    Ok(snapshots.len() as u64)
}

async fn insert_snapshot_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    backup_id: &str,
    backup_date: &str,
    s: &NewSnapshot,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO snapshots (user_id, backup_id, hubspot_page_id, page_type, name, url, html_title, \
         meta_description, slug, body_content, state, page_updated_at, backup_date, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(backup_id)
    .bind(&s.hubspot_page_id)
    .bind(&s.page_type)
    .bind(&s.name)
    .bind(&s.url)
    .bind(&s.html_title)
    .bind(&s.meta_description)
    .bind(&s.slug)
    .bind(&s.body_content)
    .bind(&s.state)
    .bind(&s.page_updated_at)
    .bind(backup_date)
    .bind(created_at)
    .fetch_one(&mut **tx)
    .await
    .with_context(|| format!("failed to insert snapshot for page {}", s.hubspot_page_id))?;
    Ok(rec.get("id"))
}

/// Append history entries in one transaction.
#[instrument(skip_all, fields(entries = entries.len()))]
pub async fn append_change_history(
    pool: &Pool,
    user_id: &str,
    changed_by: &str,
    backup_session_id: Option<i64>,
    entries: &[NewChangeEntry],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    append_change_history_tx(&mut tx, user_id, changed_by, backup_session_id, entries, Utc::now())
        .await?;
    tx.commit().await?;
    Ok(())
}

async fn append_change_history_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    changed_by: &str,
    backup_session_id: Option<i64>,
    entries: &[NewChangeEntry],
    created_at: DateTime<Utc>,
) -> Result<()> {
    for e in entries {
        sqlx::query(
            "INSERT INTO change_history (user_id, page_id, field_name, old_value, new_value, change_type, \
             changed_by, backup_session_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&e.page_id)
        .bind(&e.field_name)
        .bind(&e.old_value)
        .bind(&e.new_value)
        .bind(e.change_type.as_str())
        .bind(changed_by)
        .bind(backup_session_id)
        .bind(created_at)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("failed to record change for page {}", e.page_id))?;
    }
    Ok(())
}

/// Who wrote a generation and which backup session, if any, it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct HistoryAuthor<'a> {
    pub changed_by: &'a str,
    pub backup_session_id: Option<i64>,
}

/// Insert a generation of snapshot rows and the history entries describing
/// it. Either everything is stored or nothing is.
#[instrument(skip_all, fields(backup_id = %backup_id, rows = snapshots.len(), entries = entries.len()))]
pub async fn insert_snapshots_with_history(
    pool: &Pool,
    user_id: &str,
    backup_id: &str,
    backup_date: &str,
    snapshots: &[NewSnapshot],
    author: HistoryAuthor<'_>,
    entries: &[NewChangeEntry],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for snapshot in snapshots {
        insert_snapshot_tx(&mut tx, user_id, backup_id, backup_date, snapshot, now).await?;
    }
    append_change_history_tx(
        &mut tx,
        user_id,
        author.changed_by,
        author.backup_session_id,
        entries,
        now,
    )
    .await?;
    tx.commit().await?;
    Ok(snapshots.len() as u64)
}

#[instrument(skip_all)]
pub async fn create_backup_session(
    pool: &Pool,
    user_id: &str,
    sheet_id: &str,
    tab_name: &str,
    backup_date: &str,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO backup_sessions (user_id, sheet_id, tab_name, backup_date, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(sheet_id)
    .bind(tab_name)
    .bind(backup_date)
    .bind(BackupStatus::Pending.as_str())
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("failed to create backup session")?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn mark_backup_in_progress(pool: &Pool, session_id: i64) -> Result<()> {
    let res = sqlx::query("UPDATE backup_sessions SET status = ? WHERE id = ? AND status = ?")
        .bind(BackupStatus::InProgress.as_str())
        .bind(session_id)
        .bind(BackupStatus::Pending.as_str())
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("backup session {} is not pending", session_id));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn complete_backup_session(
    pool: &Pool,
    session_id: i64,
    pages_backed_up: i64,
    changes_detected: i64,
) -> Result<()> {
    let res = sqlx::query(
        "UPDATE backup_sessions SET status = ?, pages_backed_up = ?, changes_detected = ?, completed_at = ? \
         WHERE id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(BackupStatus::Completed.as_str())
    .bind(pages_backed_up)
    .bind(changes_detected)
    .bind(Utc::now())
    .bind(session_id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("backup session {} already finished", session_id));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn fail_backup_session(pool: &Pool, session_id: i64, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE backup_sessions SET status = ?, error = ?, completed_at = ? \
         WHERE id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(BackupStatus::Failed.as_str())
    .bind(error)
    .bind(Utc::now())
    .bind(session_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_backup_session(pool: &Pool, session_id: i64) -> Result<Option<BackupSession>> {
    let row = sqlx::query(
        "SELECT id, user_id, sheet_id, tab_name, backup_date, status, pages_backed_up, changes_detected, \
         error, completed_at FROM backup_sessions WHERE id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let status_str: String = row.get("status");
    let status = BackupStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("backup session {} has unknown status {}", session_id, status_str))?;

    Ok(Some(BackupSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        sheet_id: row.get("sheet_id"),
        tab_name: row.get("tab_name"),
        backup_date: row.get("backup_date"),
        status,
        pages_backed_up: row.get("pages_backed_up"),
        changes_detected: row.get("changes_detected"),
        error: row.try_get::<Option<String>, _>("error").ok().flatten(),
        completed_at: row
            .try_get::<Option<DateTime<Utc>>, _>("completed_at")
            .ok()
            .flatten(),
    }))
}

/// Backup lineages for a user, newest first.
#[instrument(skip_all)]
pub async fn list_versions(pool: &Pool, user_id: &str, limit: i64) -> Result<Vec<VersionSummary>> {
    let rows = sqlx::query_as::<_, VersionSummary>(
        "SELECT backup_id, MAX(backup_date) AS backup_date, MAX(created_at) AS created_at, \
         COUNT(*) AS page_count FROM snapshots WHERE user_id = ? \
         GROUP BY backup_id ORDER BY MAX(created_at) DESC, MAX(id) DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list backup versions")?;
    Ok(rows)
}

/// Change history for a user, optionally narrowed to one page, newest first.
#[instrument(skip_all)]
pub async fn list_change_history(
    pool: &Pool,
    user_id: &str,
    page_id: Option<&str>,
    limit: i64,
) -> Result<Vec<ChangeHistoryEntry>> {
    let rows = sqlx::query(
        "SELECT id, page_id, field_name, old_value, new_value, change_type, changed_by, \
         backup_session_id, created_at FROM change_history \
         WHERE user_id = ? AND (? IS NULL OR page_id = ?) ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(page_id)
    .bind(page_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list change history")?;

    rows.iter().map(history_from_row).collect()
}

fn history_from_row(row: &SqliteRow) -> Result<ChangeHistoryEntry> {
    let change_type: String = row.get("change_type");
    Ok(ChangeHistoryEntry {
        id: row.get("id"),
        page_id: row.get("page_id"),
        field_name: row.get("field_name"),
        old_value: row.try_get::<Option<String>, _>("old_value").ok().flatten(),
        new_value: row.try_get::<Option<String>, _>("new_value").ok().flatten(),
        change_type: ChangeType::parse(&change_type)
            .ok_or_else(|| anyhow!("unknown change type {}", change_type))?,
        changed_by: row.get("changed_by"),
        backup_session_id: row
            .try_get::<Option<i64>, _>("backup_session_id")
            .ok()
            .flatten(),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
pub(crate) async fn setup_test_pool() -> Pool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}
