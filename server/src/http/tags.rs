//! `/tags`, `/tag-types`, `/tag-aliases`, and the three tag-mutation task
//! kinds (`/tag-file-changes`, `/tag-splits`, `/tag-merges`).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use manga_core::model::TaskKind;

use crate::error::AppError;
use crate::rename::TagFileChangeAction;
use crate::state::AppState;

use super::spawn_background;

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let tags = tokio::task::spawn_blocking(move || state.db.list_tags())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "tags": tags })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTagBody {
    name: String,
    tag_type_id: i64,
    #[serde(default)]
    parent_id: Option<i64>,
}

pub async fn create_tag(State(state): State<AppState>, Json(body): Json<CreateTagBody>) -> Result<Json<Value>, AppError> {
    let tag = tokio::task::spawn_blocking(move || state.db.create_tag(&body.name, body.tag_type_id, body.parent_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!(tag)))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct UpdateTagBody {
    color: Option<String>,
    favorite: Option<bool>,
    description: Option<String>,
    /// `Some(None)` clears the parent; omitted means "leave untouched".
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<Option<i64>>,
}

/// Walk `candidate_parent`'s own parent chain looking for `tag_id`; a
/// hit means setting `tag_id`'s parent to `candidate_parent` would close
/// a cycle.
fn would_cycle(state: &AppState, tag_id: i64, candidate_parent: i64) -> Result<bool, AppError> {
    let mut current = Some(candidate_parent);
    let mut guard = 0;
    while let Some(id) = current {
        if id == tag_id {
            return Ok(true);
        }
        guard += 1;
        if guard > 10_000 {
            return Err(AppError::Internal("tag parent chain too deep".into()));
        }
        current = state.db.get_tag(id)?.and_then(|t| t.parent_id);
    }
    Ok(false)
}

pub async fn update_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<i64>,
    Json(body): Json<UpdateTagBody>,
) -> Result<Json<Value>, AppError> {
    if let Some(Some(parent_id)) = body.parent_id {
        if parent_id == tag_id {
            return Err(AppError::BadRequest("a tag cannot be its own parent".into()));
        }
        if would_cycle(&state, tag_id, parent_id)? {
            return Err(AppError::BadRequest("that parent would create a cycle".into()));
        }
    }

    tokio::task::spawn_blocking(move || {
        state.db.update_tag_fields(
            tag_id,
            body.color.as_deref(),
            body.favorite,
            body.description.as_deref(),
            body.parent_id,
        )
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "ok": true })))
}

pub async fn delete_tag(State(state): State<AppState>, Path(tag_id): Path<i64>) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || state.db.delete_tag(tag_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_tag_types(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let types = tokio::task::spawn_blocking(move || state.db.list_tag_types())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "tag_types": types })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTagTypeBody {
    name: String,
    #[serde(default)]
    sort_order: i32,
}

pub async fn create_tag_type(State(state): State<AppState>, Json(body): Json<CreateTagTypeBody>) -> Result<Json<Value>, AppError> {
    let tag_type = tokio::task::spawn_blocking(move || state.db.create_tag_type(&body.name, body.sort_order))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!(tag_type)))
}

pub async fn delete_tag_type(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || state.db.delete_tag_type(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_aliases(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let aliases = tokio::task::spawn_blocking(move || state.db.list_all_aliases())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    let aliases: Vec<Value> = aliases
        .into_iter()
        .map(|(id, tag_id, alias)| json!({ "id": id, "tag_id": tag_id, "alias": alias }))
        .collect();
    Ok(Json(json!({ "tag_aliases": aliases })))
}

#[derive(Debug, Deserialize)]
pub struct AddAliasBody {
    tag_id: i64,
    alias: String,
}

pub async fn add_alias(State(state): State<AppState>, Json(body): Json<AddAliasBody>) -> Result<Json<Value>, AppError> {
    let id = tokio::task::spawn_blocking(move || state.db.add_alias(body.tag_id, &body.alias))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "id": id })))
}

pub async fn remove_alias(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || state.db.remove_alias(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TagFileChangeActionBody {
    Delete,
    Rename,
}

#[derive(Debug, Deserialize)]
pub struct TagFileChangeBody {
    tag_id: i64,
    action: TagFileChangeActionBody,
    #[serde(default)]
    new_name: Option<String>,
}

pub async fn tag_file_change(State(state): State<AppState>, Json(body): Json<TagFileChangeBody>) -> Result<Json<Value>, AppError> {
    let action = match body.action {
        TagFileChangeActionBody::Delete => TagFileChangeAction::Delete,
        TagFileChangeActionBody::Rename => TagFileChangeAction::Rename,
    };
    if matches!(action, TagFileChangeAction::Rename) && body.new_name.is_none() {
        return Err(AppError::BadRequest("new_name is required for a rename".into()));
    }

    let task = state.tasks.submit("tag file change", TaskKind::TagFileChange, None, None, 0)?;

    let state2 = state.clone();
    let task_id = task.id;
    let tag_id = body.tag_id;
    let new_name = body.new_name.clone();
    spawn_background(move || {
        let _ = crate::rename::run_tag_file_change(&state2.db, &state2.tasks, task_id, tag_id, action, new_name.as_deref());
    });

    Ok(Json(json!({ "task": task })))
}

#[derive(Debug, Deserialize)]
pub struct TagSplitBody {
    source_tag_id: i64,
    new_names: Vec<String>,
}

pub async fn tag_split(State(state): State<AppState>, Json(body): Json<TagSplitBody>) -> Result<Json<Value>, AppError> {
    if body.new_names.is_empty() {
        return Err(AppError::BadRequest("new_names must not be empty".into()));
    }

    let task = state.tasks.submit("tag split", TaskKind::TagSplit, None, None, 0)?;

    let state2 = state.clone();
    let task_id = task.id;
    let source_tag_id = body.source_tag_id;
    let new_names = body.new_names.clone();
    spawn_background(move || {
        let _ = crate::rename::run_tag_split(&state2.db, &state2.tasks, task_id, source_tag_id, &new_names);
    });

    Ok(Json(json!({ "task": task })))
}

#[derive(Debug, Deserialize)]
pub struct TagMergeBody {
    source_tag_id: i64,
    target_tag_id: i64,
}

/// Tag merges only touch the catalog, never the filesystem, so they run
/// synchronously rather than through the task engine (unlike file-change
/// and split, which rewrite on-disk basenames).
pub async fn tag_merge(State(state): State<AppState>, Json(body): Json<TagMergeBody>) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || state.db.merge_tag_into(body.source_tag_id, body.target_tag_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "ok": true })))
}
