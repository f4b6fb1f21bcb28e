use std::io::Cursor;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::error;
use wbo_backup_core::{BackupRecord, CycleOutcome, CycleReport, CycleSkipReason, CycleSummary, RetentionPolicy};
use wbo_backup_storage::{BackupEngine, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BackupEngine>,
    pub api_token: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/healthz", get(healthz))
        .route("/api/v1/status", get(status))
        .route("/api/v1/cycles", post(run_cycle))
        .route("/api/v1/boards/{board}/backups", get(board_backups))
        .route("/api/v1/backups/{name}/download", get(download_backup))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
}

async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse { status: "ok" })
}

fn require_api_auth(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = &state.api_token else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    enabled: bool,
    policy: RetentionPolicy,
    running: bool,
    last_cycle: Option<CycleReport>,
}

async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, StatusCode> {
    require_api_auth(&state, &headers)?;
    Ok(Json(StatusResponse {
        enabled: state.engine.is_enabled(),
        policy: state.engine.policy(),
        running: state.engine.is_running(),
        last_cycle: state.engine.last_report().await,
    }))
}

async fn run_cycle(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CycleSummary>, StatusCode> {
    require_api_auth(&state, &headers)?;
    match state.engine.run_cycle().await {
        Ok(CycleOutcome::Completed(summary)) => Ok(Json(summary)),
        Ok(CycleOutcome::Skipped(CycleSkipReason::Overlap)) => Err(StatusCode::CONFLICT),
        Ok(CycleOutcome::Skipped(CycleSkipReason::Disabled)) => Err(StatusCode::SERVICE_UNAVAILABLE),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[derive(Debug, Serialize)]
struct BackupItem {
    file_name: String,
    timestamp_ms: i64,
    created_at: Option<String>,
}

impl From<BackupRecord> for BackupItem {
    fn from(record: BackupRecord) -> Self {
        Self {
            created_at: record.created_at().map(|at| at.to_rfc3339()),
            timestamp_ms: record.timestamp_ms,
            file_name: record.file_name,
        }
    }
}

async fn board_backups(
    Path(board): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BackupItem>>, StatusCode> {
    require_api_auth(&state, &headers)?;
    let records = state
        .engine
        .board_backups(&board)
        .await
        .map_err(|e| {
            error!(error = %format!("{e:#}"), board = %board, "listing board backups failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(records.into_iter().map(BackupItem::from).collect()))
}

async fn download_backup(
    Path(name): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    require_api_auth(&state, &headers)?;
    let bytes = match state.engine.store().read_backup(&name).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(StoreError::InvalidBackupName(_)) => return Err(StatusCode::BAD_REQUEST),
        Err(e) => {
            error!(error = %e, file = %name, "reading backup failed");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut tar_data = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_data);
        let mut hdr = tar::Header::new_gnu();
        hdr.set_size(bytes.len() as u64);
        hdr.set_mode(0o644);
        hdr.set_cksum();
        builder
            .append_data(&mut hdr, &name, Cursor::new(bytes))
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        builder
            .finish()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    }

    let compressed =
        zstd::encode_all(Cursor::new(&tar_data), 3).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename={name}.tar.zst"))
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let mut response = compressed.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zstd"));
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
