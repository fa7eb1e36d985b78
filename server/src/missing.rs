//! Missing-file cleanup task. Soft-deletion (`is_missing = true`) is the
//! scanner's job; this is the only path that hard-deletes a `File` row,
//! per the lifecycle note in §3 of the catalog model.

use manga_core::model::TaskStatus;

use crate::db::Catalog;
use crate::error::AppError;
use crate::tasks::TaskEngine;

/// Hard-delete every id in `file_ids` that is currently marked missing;
/// ids that turn out not to be missing (raced back by a scan, or never
/// missing to begin with) are skipped rather than failing the task.
pub fn run_missing_cleanup(db: &Catalog, engine: &TaskEngine, task_id: i64, file_ids: &[i64]) -> Result<(), AppError> {
    engine.mark_running(task_id)?;

    let mut eligible = Vec::with_capacity(file_ids.len());
    for &id in file_ids {
        if let Some(file) = db.get_file(id)? {
            if file.is_missing {
                eligible.push(id);
            }
        }
    }

    let total = file_ids.len() as i64;
    engine.update_progress(task_id, eligible.len() as i64, total.max(1), None)?;
    db.delete_files_hard(&eligible)?;
    engine.update_progress(task_id, total, total.max(1), None)?;
    engine.finish(task_id, TaskStatus::Completed, None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use manga_core::model::{File, Integrity, ReadingStatus};

    fn sample_file(path: &str, root_id: i64, missing: bool) -> File {
        File {
            id: 0,
            path: path.to_string(),
            library_root_id: root_id,
            size_bytes: 1,
            mtime: 1,
            total_pages: 1,
            content_hash: None,
            added_at: 0,
            last_read_page: 0,
            last_read_at: None,
            reading_status: ReadingStatus::Unread,
            is_missing: missing,
            integrity: Integrity::Unknown,
            cover_updated_at: None,
        }
    }

    #[test]
    fn only_missing_files_are_hard_deleted() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let missing_id = db.insert_file(&sample_file("/lib/a.zip", root.id, true)).unwrap();
        let present_id = db.insert_file(&sample_file("/lib/b.zip", root.id, false)).unwrap();

        let engine = TaskEngine::new(db.clone());
        let task = engine
            .submit("missing cleanup", manga_core::model::TaskKind::MissingCleanup, None, None, 0)
            .unwrap();

        run_missing_cleanup(&db, &engine, task.id, &[missing_id, present_id]).unwrap();

        assert!(db.get_file(missing_id).unwrap().is_none());
        assert!(db.get_file(present_id).unwrap().is_some());
    }
}
