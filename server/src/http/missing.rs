//! `/missing-file-cleanups`: the only route that hard-deletes a `File`
//! row, run through the task engine like every other bulk filesystem
//! operation.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use manga_core::model::TaskKind;

use crate::error::AppError;
use crate::state::AppState;

use super::spawn_background;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CleanupBody {
    file_ids: Vec<i64>,
}

pub async fn cleanup(State(state): State<AppState>, Json(body): Json<CleanupBody>) -> Result<Json<Value>, AppError> {
    let task = state.tasks.submit(
        "missing file cleanup",
        TaskKind::MissingCleanup,
        None,
        None,
        body.file_ids.len() as i64,
    )?;

    let state2 = state.clone();
    let task_id = task.id;
    let file_ids = body.file_ids.clone();
    spawn_background(move || {
        let _ = crate::missing::run_missing_cleanup(&state2.db, &state2.tasks, task_id, &file_ids);
    });

    Ok(Json(json!({ "task": task })))
}
