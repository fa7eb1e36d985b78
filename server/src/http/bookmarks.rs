//! `/files/{id}/bookmarks[/{page}]` and `/likes[/{file_id}]`. Both are
//! simple relations owned by their file; neither needs the task engine.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddBookmarkBody {
    page: i32,
    #[serde(default)]
    note: Option<String>,
}

pub async fn list_bookmarks(State(state): State<AppState>, Path(file_id): Path<i64>) -> Result<Json<Value>, AppError> {
    let bookmarks = tokio::task::spawn_blocking(move || state.db.list_bookmarks(file_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "bookmarks": bookmarks })))
}

pub async fn add_bookmark(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
    Json(body): Json<AddBookmarkBody>,
) -> Result<Json<Value>, AppError> {
    let bookmark = tokio::task::spawn_blocking(move || state.db.add_bookmark(file_id, body.page, body.note.as_deref()))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!(bookmark)))
}

pub async fn remove_bookmark(
    State(state): State<AppState>,
    Path((file_id, page)): Path<(i64, i32)>,
) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || state.db.remove_bookmark(file_id, page))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_likes(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let likes = tokio::task::spawn_blocking(move || state.db.list_likes())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "likes": likes })))
}

pub async fn like(State(state): State<AppState>, Path(file_id): Path<i64>) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || state.db.set_liked(file_id, true))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}

pub async fn unlike(State(state): State<AppState>, Path(file_id): Path<i64>) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || state.db.set_liked(file_id, false))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}
