//! `/rename-jobs`: batch rename-by-template (§4.8), submitted as its own
//! task kind alongside `/scan-jobs` and `/file-tag-batches`.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use manga_core::model::TaskKind;

use crate::error::AppError;
use crate::state::AppState;

use super::spawn_background;

#[derive(Debug, Deserialize)]
pub struct RenameJobBody {
    library_path_id: i64,
    file_ids: Vec<i64>,
    template: String,
}

pub async fn submit_rename_job(State(state): State<AppState>, Json(body): Json<RenameJobBody>) -> Result<Json<Value>, AppError> {
    if body.file_ids.is_empty() {
        return Err(AppError::BadRequest("file_ids must not be empty".into()));
    }

    let root = {
        let state = state.clone();
        let root_id = body.library_path_id;
        tokio::task::spawn_blocking(move || state.db.list_library_roots())
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??
            .into_iter()
            .find(|r| r.id == root_id)
            .ok_or_else(|| AppError::NotFound("library root".into()))?
    };

    let task = state.tasks.submit(
        "batch rename",
        TaskKind::Rename,
        Some(&root.path),
        Some(root.id),
        body.file_ids.len() as i64,
    )?;

    let state2 = state.clone();
    let task_id = task.id;
    let root_path = root.path.clone();
    let file_ids = body.file_ids.clone();
    let template = body.template.clone();
    spawn_background(move || {
        let _ = crate::rename::run_batch_rename(&state2.db, &state2.tasks, task_id, &root_path, &file_ids, &template);
    });

    Ok(Json(json!({ "task": task })))
}
