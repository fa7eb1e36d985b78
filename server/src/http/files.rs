//! `GET/PATCH /files`, `GET /files/{id}`, and the bulk tag-batch endpoint.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use manga_core::model::ReadingStatus;

use crate::db::files::{FileListFilter, SortBy};
use crate::error::AppError;
use crate::rename;
use crate::state::AppState;

use super::clamp_page_query;

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    page: Option<i64>,
    per_page: Option<i64>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    keyword: Option<String>,
    tags: Option<String>,
    exclude_tags: Option<String>,
    tag_mode: Option<String>,
    include_descendants: Option<bool>,
    statuses: Option<String>,
    liked: Option<bool>,
    min_pages: Option<i32>,
    max_pages: Option<i32>,
    min_size: Option<i64>,
    max_size: Option<i64>,
    is_missing: Option<bool>,
    include_missing: Option<bool>,
}

fn parse_ids(raw: &Option<String>) -> Vec<i64> {
    raw.as_deref()
        .map(|s| s.split(',').filter_map(|t| t.trim().parse().ok()).collect())
        .unwrap_or_default()
}

fn parse_sort_by(raw: Option<&str>) -> SortBy {
    match raw {
        Some("file_path") => SortBy::FilePath,
        Some("file_size") => SortBy::FileSize,
        Some("total_pages") => SortBy::TotalPages,
        Some("last_read_date") => SortBy::LastReadDate,
        Some("last_read_page") => SortBy::LastReadPage,
        Some("reading_status") => SortBy::ReadingStatus,
        Some("random") => SortBy::Random,
        _ => SortBy::AddDate,
    }
}

fn parse_status(raw: &str) -> Option<ReadingStatus> {
    match raw {
        "unread" => Some(ReadingStatus::Unread),
        "in_progress" => Some(ReadingStatus::InProgress),
        "finished" => Some(ReadingStatus::Finished),
        _ => None,
    }
}

pub async fn list_files(State(state): State<AppState>, Query(q): Query<ListFilesQuery>) -> Result<Json<Value>, AppError> {
    let (page, per_page) = clamp_page_query(q.page, q.per_page);
    let sort_by = parse_sort_by(q.sort_by.as_deref());
    let ascending = q.sort_order.as_deref() == Some("asc");
    let include_descendants = q.include_descendants.unwrap_or(false);
    let tag_ids = parse_ids(&q.tags);

    let filter = FileListFilter {
        keyword: q.keyword,
        tag_ids: if include_descendants && !tag_ids.is_empty() {
            let state = state.clone();
            let ids = tag_ids.clone();
            tokio::task::spawn_blocking(move || state.db.expand_tag_ids_with_descendants(&ids))
                .await
                .map_err(|e| AppError::Internal(e.to_string()))??
        } else {
            tag_ids
        },
        exclude_tag_ids: parse_ids(&q.exclude_tags),
        tag_mode_all: q.tag_mode.as_deref() == Some("all"),
        statuses: q.statuses.as_deref().map(|s| s.split(',').filter_map(parse_status).collect()).unwrap_or_default(),
        liked: q.liked,
        min_pages: q.min_pages,
        max_pages: q.max_pages,
        min_size: q.min_size,
        max_size: q.max_size,
        is_missing: q.is_missing,
        include_missing: q.include_missing.unwrap_or(false),
    };

    let (files, total) = tokio::task::spawn_blocking(move || state.db.list_files(&filter, sort_by, ascending, page, per_page))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "files": files, "total": total, "page": page, "per_page": per_page })))
}

pub async fn get_file(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>, AppError> {
    let file = tokio::task::spawn_blocking(move || state.db.get_file(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
        .ok_or_else(|| AppError::NotFound("file".into()))?;
    Ok(Json(json!(file)))
}

#[derive(Debug, Deserialize)]
pub struct PatchFileBody {
    reading_status: Option<String>,
    last_read_page: Option<i32>,
    new_filename: Option<String>,
}

fn parse_reading_status(raw: &str) -> Result<ReadingStatus, AppError> {
    match raw {
        "unread" => Ok(ReadingStatus::Unread),
        "in_progress" => Ok(ReadingStatus::InProgress),
        "finished" => Ok(ReadingStatus::Finished),
        other => Err(AppError::BadRequest(format!("invalid reading_status: {other}"))),
    }
}

/// Apply reading-progress/status updates (both are simple catalog
/// writes) and, if `new_filename` is given, a synchronous single-file
/// rename through the shared primitive — the only PATCH field that
/// touches disk.
pub async fn patch_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PatchFileBody>,
) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || -> Result<(), AppError> {
        if let Some(page) = body.last_read_page {
            state.db.update_reading_progress(id, page)?;
        } else if let Some(status) = &body.reading_status {
            state.db.set_reading_status(id, parse_reading_status(status)?)?;
        }

        if let Some(new_filename) = &body.new_filename {
            let file = state.db.get_file(id)?.ok_or_else(|| AppError::NotFound("file".into()))?;
            let old_path = std::path::Path::new(&file.path);
            let dir = old_path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let new_path = dir.join(rename::sanitize_component(new_filename));

            rename::rename(old_path, &new_path)?;
            let new_path_str = new_path.to_string_lossy().into_owned();
            state.db.update_file_path(id, &new_path_str)?;
            rename::resync_tags_for_file(&state.db, id, &new_path_str)?;
        }
        Ok(())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct BulkTagBatchBody {
    file_ids: Vec<i64>,
    #[serde(default)]
    set_tag_ids: Option<Vec<i64>>,
    #[serde(default)]
    add_tag_ids: Vec<i64>,
    #[serde(default)]
    remove_tag_ids: Vec<i64>,
}

/// Bulk add/remove/replace tags across many files in one request. This
/// is small enough to run synchronously rather than through the task
/// engine — the per-item work is a handful of catalog writes, not I/O
/// bound the way a scan or rename is.
pub async fn bulk_tag_batch(State(state): State<AppState>, Json(body): Json<BulkTagBatchBody>) -> Result<Json<Value>, AppError> {
    let updated = tokio::task::spawn_blocking(move || -> Result<usize, AppError> {
        for &file_id in &body.file_ids {
            if let Some(set_ids) = &body.set_tag_ids {
                state.db.set_file_tags(file_id, set_ids)?;
                continue;
            }
            for &tag_id in &body.add_tag_ids {
                state.db.attach_tag(file_id, tag_id)?;
            }
            for &tag_id in &body.remove_tag_ids {
                state.db.detach_tag(file_id, tag_id)?;
            }
        }
        Ok(body.file_ids.len())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "updated": updated })))
}
