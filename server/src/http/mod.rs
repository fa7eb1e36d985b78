//! HTTP surface (§6): a thin axum layer over the C5-C9 library. Routes
//! are grouped one module per resource family; every handler takes
//! `State<AppState>` and returns `Result<_, AppError>`, which `AppError`'s
//! `IntoResponse` impl turns into the `{error: string}` JSON body on
//! failure.

mod backups;
mod bookmarks;
mod files;
mod integrity;
mod library;
mod missing;
mod pages;
mod rename_jobs;
mod settings;
mod tags;
mod tasks;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde_json::json;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/files", get(files::list_files))
        .route("/files/{id}", get(files::get_file).patch(files::patch_file))
        .route("/files/{id}/pages/{n}", get(pages::get_page))
        .route("/files/{id}/pages/{n}/metadata", get(pages::get_page_metadata))
        .route("/files/{id}/cover", get(pages::get_cover))
        .route("/files/{id}/bookmarks", get(bookmarks::list_bookmarks).post(bookmarks::add_bookmark))
        .route("/files/{id}/bookmarks/{page}", delete(bookmarks::remove_bookmark))
        .route("/covers/{*name}", get(pages::get_cover_by_name))
        .route("/file-tag-batches", post(files::bulk_tag_batch))
        .route("/scan-jobs", post(tasks::submit_scan_jobs))
        .route("/rename-jobs", post(rename_jobs::submit_rename_job))
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/{id}", get(tasks::get_task).patch(tasks::patch_task))
        .route("/task-history", delete(tasks::delete_task_history))
        .route("/backups", post(backups::create_backup).get(backups::list_backups))
        .route("/backup-restores", post(backups::restore_backup))
        .route("/library-paths", get(library::list_roots).post(library::create_root))
        .route("/library-paths/{id}", delete(library::delete_root))
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/tags/{id}", patch(tags::update_tag).delete(tags::delete_tag))
        .route("/tag-types", get(tags::list_tag_types).post(tags::create_tag_type))
        .route("/tag-types/{id}", delete(tags::delete_tag_type))
        .route("/tag-aliases", get(tags::list_aliases).post(tags::add_alias))
        .route("/tag-aliases/{id}", delete(tags::remove_alias))
        .route("/tag-file-changes", post(tags::tag_file_change))
        .route("/tag-splits", post(tags::tag_split))
        .route("/tag-merges", post(tags::tag_merge))
        .route("/integrity-checks", get(integrity::list_integrity).post(integrity::run_integrity))
        .route("/missing-file-cleanups", post(missing::cleanup))
        .route("/settings", get(settings::list_settings))
        .route("/settings/{key}", get(settings::get_setting).put(settings::put_setting).delete(settings::reset_setting))
        .route("/likes", get(bookmarks::list_likes))
        .route("/likes/{file_id}", post(bookmarks::like).delete(bookmarks::unlike))
        .with_state(state)
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> axum::response::Response {
    use axum::response::IntoResponse;
    let db_ok = state.db.list_library_roots().is_ok();
    let active_tasks = state.tasks.list(None, None, true).map(|t| t.len()).unwrap_or(0);
    (
        axum::http::StatusCode::OK,
        axum::Json(json!({ "status": if db_ok { "ok" } else { "degraded" }, "active_tasks": active_tasks })),
    )
        .into_response()
}

/// Run blocking catalog/filesystem work off the async executor, then
/// detach it: handlers that kick off a task-engine job return as soon as
/// the task record exists, with the actual work proceeding in the
/// background the way the scanner/rename/tag-mutator already expect.
pub(crate) fn spawn_background<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        let _ = tokio::task::spawn_blocking(f).await;
    });
}

pub(crate) fn clamp_page_query(page: Option<i64>, per_page: Option<i64>) -> (i64, i64) {
    (page.unwrap_or(1).max(1), per_page.unwrap_or(50).clamp(1, 200))
}
