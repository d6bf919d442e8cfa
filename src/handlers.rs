//! HTTP triggers for the sync engines.
//!
//! Every mutating or sheet-reading operation takes the caller's per-user lock
//! first, so two tabs of the same user cannot interleave a detect with a sync.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api_error::{AppError, AppResult};
use crate::apply::{self, ApplyReport};
use crate::db::{self, ChangeHistoryEntry, VersionSummary};
use crate::detect;
use crate::error::SyncError;
use crate::model::{Credentials, PageChange, SheetLocation};
use crate::revert::{self, RevertReport};
use crate::state::AppState;
use crate::tracker::{self, BackupReport};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// `{"success": true, ...body}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    fn ok(body: T) -> Json<Self> {
        Json(Self {
            success: true,
            body,
        })
    }
}

fn require_user(user_id: &str) -> AppResult<&str> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::BadRequest("userId must be non-empty".to_string()));
    }
    Ok(user_id)
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub user_id: String,
    pub spreadsheet_id: String,
    pub tab_name: String,
    pub google_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub changes: Vec<PageChange>,
    pub baseline_backup_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// POST /api/changes/detect
#[instrument(skip_all)]
pub async fn detect_changes(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> AppResult<Json<Envelope<DetectResponse>>> {
    let user_id = require_user(&req.user_id)?;
    if req.spreadsheet_id.trim().is_empty() || req.tab_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "spreadsheetId and tabName must be non-empty".to_string(),
        ));
    }
    let creds = Credentials::new(None, req.google_token.as_deref());
    let location = SheetLocation {
        spreadsheet_id: req.spreadsheet_id.clone(),
        tab_name: req.tab_name.clone(),
    };

    let _guard = state.locks.acquire(user_id).await;
    let outcome = detect::detect_changes(&state.ctx, user_id, &creds, &location).await?;
    let message = outcome.message();
    Ok(Envelope::ok(DetectResponse {
        changes: outcome.changes,
        baseline_backup_id: outcome.baseline_backup_id,
        message,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub user_id: String,
    pub hubspot_token: Option<String>,
    pub changes: Vec<PageChange>,
}

/// POST /api/changes/apply
#[instrument(skip_all)]
pub async fn apply_changes(
    State(state): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> AppResult<Json<Envelope<ApplyReport>>> {
    let user_id = require_user(&req.user_id)?;
    let creds = Credentials::new(req.hubspot_token.as_deref(), None);

    let _guard = state.locks.acquire(user_id).await;
    let report = apply::apply_changes(&state.ctx, user_id, &creds, &req.changes).await?;
    Ok(Envelope::ok(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertRequest {
    pub user_id: String,
    pub hubspot_token: Option<String>,
    pub google_token: Option<String>,
    pub version_id: String,
}

/// POST /api/revert
#[instrument(skip_all)]
pub async fn revert(
    State(state): State<AppState>,
    Json(req): Json<RevertRequest>,
) -> AppResult<Json<Envelope<RevertReport>>> {
    let user_id = require_user(&req.user_id)?;
    if req.version_id.trim().is_empty() {
        return Err(AppError::BadRequest("versionId must be non-empty".to_string()));
    }
    let creds = Credentials::new(req.hubspot_token.as_deref(), req.google_token.as_deref());

    let _guard = state.locks.acquire(user_id).await;
    let report =
        revert::revert_to_version(&state.ctx, user_id, &creds, req.version_id.trim()).await?;
    Ok(Envelope::ok(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    pub user_id: String,
    pub hubspot_token: Option<String>,
    pub google_token: Option<String>,
    pub spreadsheet_id: String,
}

/// POST /api/backup
#[instrument(skip_all)]
pub async fn backup(
    State(state): State<AppState>,
    Json(req): Json<BackupRequest>,
) -> AppResult<Json<Envelope<BackupReport>>> {
    let user_id = require_user(&req.user_id)?;
    if req.spreadsheet_id.trim().is_empty() {
        return Err(AppError::BadRequest("spreadsheetId must be non-empty".to_string()));
    }
    let creds = Credentials::new(req.hubspot_token.as_deref(), req.google_token.as_deref());

    let _guard = state.locks.acquire(user_id).await;
    let report = tracker::run_backup(&state.ctx, user_id, &creds, &req.spreadsheet_id).await?;
    Ok(Envelope::ok(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionsQuery {
    pub user_id: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionSummary>,
}

/// GET /api/versions
pub async fn list_versions(
    State(state): State<AppState>,
    Query(q): Query<VersionsQuery>,
) -> AppResult<Json<Envelope<VersionsResponse>>> {
    let user_id = require_user(&q.user_id)?;
    let versions = db::list_versions(&state.ctx.pool, user_id, clamp_limit(q.limit))
        .await
        .map_err(SyncError::Storage)?;
    Ok(Envelope::ok(VersionsResponse { versions }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_id: String,
    pub page_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<ChangeHistoryEntry>,
}

/// GET /api/history
pub async fn list_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> AppResult<Json<Envelope<HistoryResponse>>> {
    let user_id = require_user(&q.user_id)?;
    let page_id = q.page_id.as_deref().filter(|p| !p.trim().is_empty());
    let history = db::list_change_history(&state.ctx.pool, user_id, page_id, clamp_limit(q.limit))
        .await
        .map_err(SyncError::Storage)?;
    Ok(Envelope::ok(HistoryResponse { history }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = sqlx::query("SELECT 1")
        .execute(&state.ctx.pool)
        .await
        .is_ok();
    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
    })
}
