//! `/settings[/:key]`: the C4 defaults table plus whatever overrides the
//! catalog has stored. Writes go to both places — the `settings` table
//! (so they survive a restart) and the live [`Settings`] snapshot held
//! in [`AppState`] (so the next request sees the new value without a
//! reload).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

pub async fn list_settings(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let snapshot = state.settings_snapshot().snapshot();
    Ok(Json(json!({ "settings": snapshot })))
}

pub async fn get_setting(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Value>, AppError> {
    let value = state
        .settings_snapshot()
        .get(&key)
        .ok_or_else(|| AppError::NotFound(format!("unknown setting: {key}")))?;
    Ok(Json(json!({ "key": key, "value": value })))
}

#[derive(Debug, Deserialize)]
pub struct PutSettingBody {
    value: String,
}

pub async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<PutSettingBody>,
) -> Result<Json<Value>, AppError> {
    if state.settings_snapshot().get(&key).is_none() {
        return Err(AppError::NotFound(format!("unknown setting: {key}")));
    }

    let db = state.db.clone();
    let key_for_db = key.clone();
    let value_for_db = body.value.clone();
    tokio::task::spawn_blocking(move || db.set_setting(&key_for_db, &value_for_db))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let new_value = {
        let mut settings = state.settings.write();
        settings.set(&key, &body.value);
        settings.get(&key)
    };

    Ok(Json(json!({ "key": key, "value": new_value })))
}

pub async fn reset_setting(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Value>, AppError> {
    let db = state.db.clone();
    let key_for_db = key.clone();
    tokio::task::spawn_blocking(move || db.reset_setting(&key_for_db))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let new_value = {
        let mut settings = state.settings.write();
        settings.reset(&key);
        settings.get(&key)
    };

    Ok(Json(json!({ "key": key, "value": new_value })))
}
