//! `/integrity-checks`: run the dedicated integrity task, or consult the
//! last result without re-running anything.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use manga_core::model::{Integrity, TaskKind};

use crate::error::AppError;
use crate::state::AppState;

use super::spawn_background;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RunIntegrityBody {
    file_ids: Vec<i64>,
}

pub async fn run_integrity(State(state): State<AppState>, Json(body): Json<RunIntegrityBody>) -> Result<Json<Value>, AppError> {
    let task = state.tasks.submit(
        "integrity check",
        TaskKind::IntegrityCheck,
        None,
        None,
        body.file_ids.len() as i64,
    )?;

    let state2 = state.clone();
    let task_id = task.id;
    let file_ids = body.file_ids.clone();
    spawn_background(move || {
        let _ = crate::integrity::run_integrity_check(&state2.db, &state2.tasks, &state2.archive, task_id, &file_ids);
    });

    Ok(Json(json!({ "task": task })))
}

#[derive(Debug, Deserialize)]
pub struct ListIntegrityQuery {
    #[serde(default)]
    corrupted_only: bool,
}

pub async fn list_integrity(State(state): State<AppState>, Query(q): Query<ListIntegrityQuery>) -> Result<Json<Value>, AppError> {
    let files = tokio::task::spawn_blocking(move || {
        if q.corrupted_only {
            state.db.list_files_by_integrity(Integrity::Corrupted)
        } else {
            let mut ok = state.db.list_files_by_integrity(Integrity::Ok)?;
            ok.extend(state.db.list_files_by_integrity(Integrity::Corrupted)?);
            Ok(ok)
        }
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "files": files })))
}
