//! Task-record persistence backing the task engine (C6). The state
//! machine itself (legal transitions, sticky terminal states) lives in
//! `crate::tasks`; this module is the store these operations read from
//! and write to.

use manga_core::model::{Task, TaskKind, TaskStatus};
use rusqlite::{params, OptionalExtension, Row};

use super::{now_unix, Catalog};
use crate::error::AppError;

fn kind_to_str(k: TaskKind) -> &'static str {
    match k {
        TaskKind::Scan => "scan",
        TaskKind::ScanAll => "scan_all",
        TaskKind::Rename => "rename",
        TaskKind::BulkTag => "bulk_tag",
        TaskKind::TagFileChange => "tag_file_change",
        TaskKind::TagSplit => "tag_split",
        TaskKind::MissingCleanup => "missing_cleanup",
        TaskKind::IntegrityCheck => "integrity_check",
    }
}

fn kind_from_str(s: &str) -> TaskKind {
    match s {
        "scan_all" => TaskKind::ScanAll,
        "rename" => TaskKind::Rename,
        "bulk_tag" => TaskKind::BulkTag,
        "tag_file_change" => TaskKind::TagFileChange,
        "tag_split" => TaskKind::TagSplit,
        "missing_cleanup" => TaskKind::MissingCleanup,
        "integrity_check" => TaskKind::IntegrityCheck,
        _ => TaskKind::Scan,
    }
}

fn status_to_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Pending,
    }
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: kind_from_str(&row.get::<_, String>("kind")?),
        worker_handle: row.get("worker_handle")?,
        status: status_from_str(&row.get::<_, String>("status")?),
        progress_pct: row.get::<_, i64>("progress_pct")? as u8,
        current_target: row.get("current_target")?,
        target_path: row.get("target_path")?,
        library_root_id: row.get("library_root_id")?,
        total: row.get("total")?,
        processed: row.get("processed")?,
        error: row.get("error")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
    })
}

impl Catalog {
    /// At-most-one-active-per-target: for a scan of `library_root_id`
    /// (or a global scan when `None`), returns the id of any non-terminal
    /// scan task already covering that target.
    pub fn find_active_scan(&self, library_root_id: Option<i64>) -> Result<Option<i64>, AppError> {
        self.with_conn(|conn| {
            let sql = match library_root_id {
                Some(_) => {
                    "SELECT id FROM tasks WHERE kind IN ('scan','scan_all')
                     AND status IN ('pending','running')
                     AND (library_root_id = ?1 OR kind = 'scan_all') LIMIT 1"
                }
                None => {
                    "SELECT id FROM tasks WHERE kind IN ('scan','scan_all')
                     AND status IN ('pending','running') LIMIT 1"
                }
            };
            conn.query_row(sql, params![library_root_id], |r| r.get(0)).optional()
        })
    }

    pub fn submit_task(
        &self,
        name: &str,
        kind: TaskKind,
        target_path: Option<&str>,
        library_root_id: Option<i64>,
        total: i64,
    ) -> Result<Task, AppError> {
        let created_at = now_unix();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (name, kind, status, progress_pct, target_path, library_root_id,
                    total, processed, created_at)
                 VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, 0, ?6)",
                params![name, kind_to_str(kind), target_path, library_root_id, total, created_at],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Task {
                id,
                name: name.to_string(),
                kind,
                worker_handle: None,
                status: TaskStatus::Pending,
                progress_pct: 0,
                current_target: None,
                target_path: target_path.map(str::to_string),
                library_root_id,
                total,
                processed: 0,
                error: None,
                created_at,
                started_at: None,
                finished_at: None,
            })
        })
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>, AppError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], row_to_task).optional()
        })
    }

    pub fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        kind: Option<TaskKind>,
        active_only: bool,
    ) -> Result<Vec<Task>, AppError> {
        self.with_conn(|conn| {
            let mut where_clauses = Vec::new();
            let mut args: Vec<String> = Vec::new();
            if let Some(status) = status {
                where_clauses.push(format!("status = '{}'", status_to_str(status)));
            }
            if active_only {
                where_clauses.push("status IN ('pending','running')".to_string());
            }
            if let Some(kind) = kind {
                where_clauses.push(format!("kind = '{}'", kind_to_str(kind)));
            }
            let _ = &args;
            let where_sql =
                if where_clauses.is_empty() { String::new() } else { format!("WHERE {}", where_clauses.join(" AND ")) };
            let sql = format!("SELECT * FROM tasks {where_sql} ORDER BY created_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_task)?;
            args.clear();
            rows.collect()
        })
    }

    pub fn mark_task_running(&self, id: i64, worker_handle: &str) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET status = 'running', worker_handle = ?2, started_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id, worker_handle, now_unix()],
            )
        })?;
        Ok(())
    }

    pub fn update_task_progress(
        &self,
        id: i64,
        processed: i64,
        total: i64,
        current_target: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), AppError> {
        let pct = if total <= 0 { 0 } else { ((processed.min(total) * 100) / total).clamp(0, 100) };
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET processed = ?2, total = ?3, progress_pct = ?4, current_target = ?5, error = ?6
                 WHERE id = ?1 AND status NOT IN ('completed','failed','cancelled')",
                params![id, processed, total, pct, current_target, error],
            )
        })?;
        Ok(())
    }

    /// Writes `finished_at` and the terminal status. A task already in a
    /// terminal state is left untouched — sticky terminal states.
    pub fn finish_task(&self, id: i64, status: TaskStatus, error: Option<&str>) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET status = ?2, error = ?3, finished_at = ?4
                 WHERE id = ?1 AND status NOT IN ('completed','failed','cancelled')",
                params![id, status_to_str(status), error, now_unix()],
            )
        })?;
        Ok(())
    }

    /// Valid only while the task is pending/running; a terminal task is
    /// left untouched. This sets a flag alongside `status` rather than
    /// a status value of its own — the task keeps reporting
    /// pending/running until the worker observes the flag and finishes
    /// with `cancelled`.
    pub fn request_cancel(&self, id: i64) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET cancel_requested = 1 WHERE id = ?1 AND status IN ('pending','running')",
                params![id],
            )
        })?;
        Ok(())
    }

    /// Authoritative read workers poll at the engine's throttled
    /// interval; `true` once a cancel has been requested, regardless of
    /// whether the task has since reached a terminal state.
    pub fn is_cancel_requested(&self, id: i64) -> Result<bool, AppError> {
        self.with_conn(|conn| {
            let flag: Option<i64> =
                conn.query_row("SELECT cancel_requested FROM tasks WHERE id = ?1", params![id], |r| r.get(0)).optional()?;
            Ok(flag.unwrap_or(0) != 0)
        })
    }

    pub fn delete_terminal_tasks_older_than(&self, cutoff_unix: i64) -> Result<u64, AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM tasks WHERE status IN ('completed','failed','cancelled') AND finished_at < ?1",
                params![cutoff_unix],
            )
            .map(|n| n as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_most_one_active_scan_per_root() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let t = db.submit_task("scan /lib", TaskKind::Scan, Some("/lib"), Some(root.id), 0).unwrap();

        let active = db.find_active_scan(Some(root.id)).unwrap();
        assert_eq!(active, Some(t.id));
    }

    #[test]
    fn terminal_state_is_sticky() {
        let db = Catalog::open_in_memory().unwrap();
        let t = db.submit_task("scan", TaskKind::Scan, None, None, 10).unwrap();
        db.mark_task_running(t.id, "worker-1").unwrap();
        db.finish_task(t.id, TaskStatus::Completed, None).unwrap();

        db.update_task_progress(t.id, 5, 10, Some("x"), None).unwrap();
        let after = db.get_task(t.id).unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Completed);
        assert_eq!(after.processed, 0);

        db.finish_task(t.id, TaskStatus::Failed, Some("late failure")).unwrap();
        let after = db.get_task(t.id).unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Completed);
    }

    #[test]
    fn progress_saturates_at_total() {
        let db = Catalog::open_in_memory().unwrap();
        let t = db.submit_task("scan", TaskKind::Scan, None, None, 10).unwrap();
        db.mark_task_running(t.id, "worker-1").unwrap();
        db.update_task_progress(t.id, 20, 10, None, None).unwrap();
        let after = db.get_task(t.id).unwrap().unwrap();
        assert_eq!(after.progress_pct, 100);
    }
}
