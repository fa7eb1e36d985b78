//! `GET /files/{id}/pages/{n}[/metadata]`, `/files/{id}/cover`, and the
//! direct `/covers/{*name}` route.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use manga_archive::cover;
use manga_core::path_normalize;

use crate::error::AppError;
use crate::pages::{render_options_from_settings, serve_cover, serve_page, RenderOptions};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenderQuery {
    max_side_px: Option<u32>,
    format: Option<String>,
    quality: Option<u8>,
    resample: Option<String>,
}

fn apply_overrides(mut options: RenderOptions, q: &RenderQuery) -> RenderOptions {
    if let Some(max_side_px) = q.max_side_px {
        options.max_side_px = max_side_px;
    }
    if let Some(quality) = q.quality {
        options.quality = quality;
    }
    if let Some(format) = &q.format {
        options.format = match format.as_str() {
            "jpeg" => crate::pages::OutputFormat::Jpeg,
            "png" => crate::pages::OutputFormat::Png,
            "webp" => crate::pages::OutputFormat::WebP,
            _ => crate::pages::OutputFormat::Auto,
        };
    }
    if let Some(resample) = &q.resample {
        options.resample = match resample.as_str() {
            "nearest" => image::imageops::FilterType::Nearest,
            "triangle" => image::imageops::FilterType::Triangle,
            _ => image::imageops::FilterType::Lanczos3,
        };
    }
    options
}

pub async fn get_page(
    State(state): State<AppState>,
    Path((id, n)): Path<(i64, i32)>,
    Query(q): Query<RenderQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    tokio::task::spawn_blocking(move || -> Result<Response, AppError> {
        let file = state.db.get_file(id)?.ok_or_else(|| AppError::NotFound("file".into()))?;
        let settings = state.settings_snapshot();
        let options = apply_overrides(render_options_from_settings(&settings), &q);
        serve_page(&state.archive, &settings, &file, n, &headers, options)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

pub async fn get_page_metadata(
    State(state): State<AppState>,
    Path((id, n)): Path<(i64, i32)>,
) -> Result<Json<serde_json::Value>, AppError> {
    tokio::task::spawn_blocking(move || -> Result<Json<serde_json::Value>, AppError> {
        let file = state.db.get_file(id)?.ok_or_else(|| AppError::NotFound("file".into()))?;
        let clamped = file.clamp_page(n);
        if clamped != n {
            return Err(AppError::BadRequest(format!("page {n} out of range (0..{})", file.total_pages)));
        }
        let path = std::path::Path::new(&file.path);
        let entry = state.archive.entry(path, clamped as usize)?;
        let size = state.archive.size(path, &entry)?;
        Ok(Json(json!({ "name": entry.name, "size": size, "mime": state.archive.guess_mime(&entry.name) })))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

#[derive(Debug, Deserialize)]
pub struct CoverQuery {
    #[allow(dead_code)]
    v: Option<String>,
}

pub async fn get_cover(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(_q): Query<CoverQuery>,
) -> Result<Response, AppError> {
    tokio::task::spawn_blocking(move || -> Result<Response, AppError> {
        let settings = state.settings_snapshot();
        let shard_count = settings.get_int("cover.cache.shard_count").unwrap_or(256) as u32;
        let path = cover::cache_path(&state.covers_dir(), id, shard_count);
        serve_cover(&path)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

/// Direct cover lookup by its on-disk relative path (`<shard>/<id>.webp`).
/// The normalizer collapses any `..`/`.` components; a result that no
/// longer starts with the covers directory is a traversal attempt and is
/// rejected rather than served.
pub async fn get_cover_by_name(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, AppError> {
    tokio::task::spawn_blocking(move || -> Result<Response, AppError> {
        let covers_dir = state.covers_dir();
        let candidate = covers_dir.join(&name);
        let normalized = path_normalize::normalize_file(&candidate.to_string_lossy());
        let base_normalized = path_normalize::normalize_file(&covers_dir.to_string_lossy());
        if !normalized.starts_with(&base_normalized) {
            return Err(AppError::BadRequest("invalid cover path".into()));
        }
        serve_cover(std::path::Path::new(&normalized))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}
