//! `/backups` and `/backup-restores`: a bare file copy of the catalog
//! database, per the contract in §6 — no quiescing, no locking beyond
//! what SQLite's own WAL mode already gives a reader mid-copy.

use std::fs;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config;
use crate::error::AppError;
use crate::state::AppState;

pub async fn create_backup(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let filename = tokio::task::spawn_blocking(move || -> Result<String, AppError> {
        state.config.ensure_dirs()?;
        let filename = config::backup_filename(crate::db::now_unix());
        let dest = state.config.backups_dir().join(&filename);
        fs::copy(state.config.db_path(), &dest)?;
        Ok(filename)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "filename": filename })))
}

pub async fn list_backups(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>, AppError> {
        let mut names = Vec::new();
        let dir = state.config.backups_dir();
        if dir.is_dir() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if let Some(name) = entry.file_name().to_str() {
                    if config::is_valid_backup_filename(name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "backups": names })))
}

#[derive(Debug, Deserialize)]
pub struct RestoreBody {
    filename: String,
}

pub async fn restore_backup(State(state): State<AppState>, Json(body): Json<RestoreBody>) -> Result<Json<Value>, AppError> {
    tokio::task::spawn_blocking(move || -> Result<(), AppError> {
        let source = config::resolve_backup_path(&state.config.backups_dir(), &body.filename)
            .ok_or_else(|| AppError::BadRequest("invalid backup filename".into()))?;
        if !source.is_file() {
            return Err(AppError::NotFound("backup file".into()));
        }
        fs::copy(&source, state.config.db_path())?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "ok": true })))
}
