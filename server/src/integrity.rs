//! Dedicated integrity-check task. The scanner only ever sets
//! `integrity = unknown -> ok` implicitly by successfully listing a
//! file's entries during analysis; turning a listing failure into
//! `corrupted` is this task's job alone (§4.7 edge case), so a
//! transient read error during a routine scan never poisons a file's
//! integrity flag.

use std::path::Path;
use std::sync::Arc;

use manga_archive::ArchiveReader;
use manga_core::model::{Integrity, TaskStatus};

use crate::db::Catalog;
use crate::error::AppError;
use crate::tasks::TaskEngine;

/// Run an integrity check over `file_ids` (or every non-missing file
/// when empty), marking each `ok` or `corrupted` depending on whether
/// its archive's entry list can be read.
pub fn run_integrity_check(
    db: &Catalog,
    engine: &TaskEngine,
    archive: &Arc<ArchiveReader>,
    task_id: i64,
    file_ids: &[i64],
) -> Result<(), AppError> {
    engine.mark_running(task_id)?;

    let targets = if file_ids.is_empty() { db.list_all_file_ids()? } else { file_ids.to_vec() };
    let total = targets.len() as i64;
    let mut corrupted = 0i64;

    for (n, &file_id) in targets.iter().enumerate() {
        if let Some(file) = db.get_file(file_id)? {
            if !file.is_missing {
                let result = archive.list(Path::new(&file.path));
                let integrity = if result.is_ok() { Integrity::Ok } else { Integrity::Corrupted };
                if integrity == Integrity::Corrupted {
                    corrupted += 1;
                }
                db.set_integrity(file_id, integrity)?;
            }
        }
        engine.update_progress(task_id, n as i64 + 1, total.max(1), Some(&file_id.to_string()))?;
    }

    let message = if corrupted > 0 { Some(format!("{corrupted}/{total} files corrupted")) } else { None };
    engine.finish(task_id, TaskStatus::Completed, message.as_deref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use manga_core::model::{File, ReadingStatus};

    #[test]
    fn unreadable_archive_is_marked_corrupted() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let id = db
            .insert_file(&File {
                id: 0,
                path: "/nonexistent/a.zip".into(),
                library_root_id: root.id,
                size_bytes: 1,
                mtime: 1,
                total_pages: 0,
                content_hash: None,
                added_at: 0,
                last_read_page: 0,
                last_read_at: None,
                reading_status: ReadingStatus::Unread,
                is_missing: false,
                integrity: Integrity::Unknown,
                cover_updated_at: None,
            })
            .unwrap();

        let engine = TaskEngine::new(db.clone());
        let archive = Arc::new(ArchiveReader::new());
        let task = engine.submit("integrity", manga_core::model::TaskKind::IntegrityCheck, None, None, 0).unwrap();

        run_integrity_check(&db, &engine, &archive, task.id, &[id]).unwrap();

        let file = db.get_file(id).unwrap().unwrap();
        assert_eq!(file.integrity, Integrity::Corrupted);
    }
}
