//! `/library-paths[/:id]`: library-root registration. Normalization
//! (§4.2) is always applied on write so no non-normalized path is ever
//! persisted, and re-registering an already-normalized root is a no-op
//! rather than a conflict (the catalog's `create_library_root` is
//! already idempotent on the normalized path).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use manga_core::path_normalize;

use crate::error::AppError;
use crate::state::AppState;

pub async fn list_roots(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let roots = tokio::task::spawn_blocking(move || state.db.list_library_roots())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "library_paths": roots })))
}

#[derive(Debug, Deserialize)]
pub struct CreateRootBody {
    path: String,
}

pub async fn create_root(State(state): State<AppState>, Json(body): Json<CreateRootBody>) -> Result<Json<Value>, AppError> {
    let root = tokio::task::spawn_blocking(move || {
        let normalized = path_normalize::normalize_root(&body.path);
        state.db.create_library_root(&normalized)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!(root)))
}

pub async fn delete_root(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || state.db.delete_library_root(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}
