//! Scan submission and the task-engine's own list/detail/cancel/trim
//! surface.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use manga_core::model::{TaskKind, TaskStatus};

use crate::error::AppError;
use crate::scan::Scanner;
use crate::state::AppState;

use super::spawn_background;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ScanJobBody {
    library_path_id: Option<i64>,
    library_path_ids: Vec<i64>,
}

/// `{}` (both fields empty) means "scan every root", submitted as one
/// `scan_all` task so the at-most-one-active-scan rule blocks the
/// whole fleet rather than letting per-root jobs race it.
pub async fn submit_scan_jobs(State(state): State<AppState>, Json(body): Json<ScanJobBody>) -> Result<Json<Value>, AppError> {
    let mut target_ids = body.library_path_ids.clone();
    if let Some(id) = body.library_path_id {
        target_ids.push(id);
    }

    if target_ids.is_empty() {
        let roots = {
            let state = state.clone();
            tokio::task::spawn_blocking(move || state.db.list_library_roots())
                .await
                .map_err(|e| AppError::Internal(e.to_string()))??
        };
        let task = state.tasks.submit("scan all libraries", TaskKind::ScanAll, None, None, roots.len() as i64)?;

        let state = state.clone();
        let task_id = task.id;
        spawn_background(move || {
            let scanner = Scanner::new(state.db.clone(), state.archive.clone(), state.tasks.clone(), state.covers_dir());
            let settings = state.settings_snapshot();
            let roots: Vec<(i64, String)> = roots.into_iter().map(|r| (r.id, r.path)).collect();
            let _ = scanner.run_all(task_id, &roots, &settings);
        });

        return Ok(Json(json!({ "tasks": [task] })));
    }

    let mut created = Vec::with_capacity(target_ids.len());
    for root_id in target_ids {
        let db = state.db.clone();
        let root_row = tokio::task::spawn_blocking(move || db.list_library_roots())
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??
            .into_iter()
            .find(|r| r.id == root_id)
            .ok_or_else(|| AppError::NotFound("library root".into()))?;

        let task = state.tasks.submit(&format!("scan {}", root_row.path), TaskKind::Scan, Some(&root_row.path), Some(root_row.id), 0)?;

        let state = state.clone();
        let task_id = task.id;
        let root_path = root_row.path.clone();
        spawn_background(move || {
            let scanner = Scanner::new(state.db.clone(), state.archive.clone(), state.tasks.clone(), state.covers_dir());
            let settings = state.settings_snapshot();
            let _ = scanner.run(task_id, root_id, &root_path, &settings);
        });
        created.push(task);
    }

    Ok(Json(json!({ "tasks": created })))
}

fn parse_status(raw: &str) -> Option<TaskStatus> {
    match raw {
        "pending" => Some(TaskStatus::Pending),
        "running" => Some(TaskStatus::Running),
        "completed" => Some(TaskStatus::Completed),
        "failed" => Some(TaskStatus::Failed),
        "cancelled" => Some(TaskStatus::Cancelled),
        _ => None,
    }
}

fn parse_kind(raw: &str) -> Option<TaskKind> {
    match raw {
        "scan" => Some(TaskKind::Scan),
        "scan_all" => Some(TaskKind::ScanAll),
        "rename" => Some(TaskKind::Rename),
        "bulk_tag" => Some(TaskKind::BulkTag),
        "tag_file_change" => Some(TaskKind::TagFileChange),
        "tag_split" => Some(TaskKind::TagSplit),
        "missing_cleanup" => Some(TaskKind::MissingCleanup),
        "integrity_check" => Some(TaskKind::IntegrityCheck),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    status: Option<String>,
    task_type: Option<String>,
    #[serde(default)]
    active_only: bool,
}

pub async fn list_tasks(State(state): State<AppState>, Query(q): Query<ListTasksQuery>) -> Result<Json<Value>, AppError> {
    let status = q.status.as_deref().and_then(parse_status);
    let kind = q.task_type.as_deref().and_then(parse_kind);
    let tasks = tokio::task::spawn_blocking(move || state.tasks.list(status, kind, q.active_only))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "tasks": tasks })))
}

pub async fn get_task(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>, AppError> {
    let task = tokio::task::spawn_blocking(move || state.tasks.get(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
        .ok_or_else(|| AppError::NotFound("task".into()))?;
    Ok(Json(json!(task)))
}

#[derive(Debug, Deserialize)]
pub struct PatchTaskBody {
    status: String,
}

/// The only supported transition is a cancellation request; anything
/// else in `status` is rejected rather than silently ignored.
pub async fn patch_task(State(state): State<AppState>, Path(id): Path<i64>, Json(body): Json<PatchTaskBody>) -> Result<Json<Value>, AppError> {
    if body.status != "cancelled" {
        return Err(AppError::BadRequest("only status=cancelled is supported".into()));
    }
    tokio::task::spawn_blocking(move || state.tasks.request_cancel(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct TrimHistoryQuery {
    days: i64,
}

pub async fn delete_task_history(State(state): State<AppState>, Query(q): Query<TrimHistoryQuery>) -> Result<Json<Value>, AppError> {
    let days = q.days.clamp(0, 3650);
    let deleted = tokio::task::spawn_blocking(move || state.tasks.trim_history(days))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "deleted": deleted })))
}
