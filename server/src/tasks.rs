//! Task engine (C6): the state machine and at-most-one-active-per-target
//! rule sitting on top of the catalog's task table. Workers never touch
//! `Catalog` directly for task bookkeeping — they go through this.

use manga_core::model::{Task, TaskKind, TaskStatus};
use uuid::Uuid;

use crate::db::Catalog;
use crate::error::AppError;

#[derive(Clone)]
pub struct TaskEngine {
    db: Catalog,
}

impl TaskEngine {
    pub fn new(db: Catalog) -> Self {
        Self { db }
    }

    /// Submit a task, refusing with `Conflict` if a non-terminal scan
    /// already covers the same target (the root, or globally for
    /// scan-all).
    pub fn submit(
        &self,
        name: &str,
        kind: TaskKind,
        target_path: Option<&str>,
        library_root_id: Option<i64>,
        total: i64,
    ) -> Result<Task, AppError> {
        if matches!(kind, TaskKind::Scan | TaskKind::ScanAll) {
            if let Some(active_id) = self.db.find_active_scan(library_root_id)? {
                return Err(AppError::Conflict(format!("scan already active: task {active_id}")));
            }
        }
        self.db.submit_task(name, kind, target_path, library_root_id, total)
    }

    pub fn mark_running(&self, task_id: i64) -> Result<String, AppError> {
        let handle = Uuid::new_v4().to_string();
        self.db.mark_task_running(task_id, &handle)?;
        Ok(handle)
    }

    pub fn update_progress(
        &self,
        task_id: i64,
        processed: i64,
        total: i64,
        current_target: Option<&str>,
    ) -> Result<(), AppError> {
        self.db.update_task_progress(task_id, processed, total, current_target, None)
    }

    pub fn finish(&self, task_id: i64, status: TaskStatus, error: Option<&str>) -> Result<(), AppError> {
        self.db.finish_task(task_id, status, error)
    }

    /// Valid only for a pending/running task; the request is a no-op
    /// against an already-terminal one.
    pub fn request_cancel(&self, task_id: i64) -> Result<(), AppError> {
        let task = self.db.get_task(task_id)?.ok_or_else(|| AppError::NotFound("task".into()))?;
        if task.status.is_terminal() {
            return Err(AppError::Conflict("task has already finished".into()));
        }
        self.db.request_cancel(task_id)
    }

    pub fn is_cancelled(&self, task_id: i64) -> Result<bool, AppError> {
        self.db.is_cancel_requested(task_id)
    }

    pub fn get(&self, task_id: i64) -> Result<Option<Task>, AppError> {
        self.db.get_task(task_id)
    }

    pub fn list(
        &self,
        status: Option<TaskStatus>,
        kind: Option<TaskKind>,
        active_only: bool,
    ) -> Result<Vec<Task>, AppError> {
        self.db.list_tasks(status, kind, active_only)
    }

    /// Delete terminal tasks older than `retention_days`.
    pub fn trim_history(&self, retention_days: i64) -> Result<u64, AppError> {
        let cutoff = crate::db::now_unix() - retention_days * 86_400;
        self.db.delete_terminal_tasks_older_than(cutoff)
    }
}

/// Throttled cancellation poll: workers call [`CancelThrottle::should_check`]
/// between items, and only hit the store when the configured interval
/// has actually elapsed — per-item store reads would dominate CPU on
/// fast trees.
pub struct CancelThrottle {
    interval: std::time::Duration,
    last_check: std::time::Instant,
}

impl CancelThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self { interval: std::time::Duration::from_millis(interval_ms), last_check: std::time::Instant::now() }
    }

    /// Returns `true` and resets the clock if the interval has elapsed,
    /// `false` (cheaply) otherwise.
    pub fn should_check(&mut self) -> bool {
        if self.last_check.elapsed() >= self.interval {
            self.last_check = std::time::Instant::now();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_conflicts_on_active_scan() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let engine = TaskEngine::new(db);

        let first = engine.submit("scan /lib", TaskKind::Scan, Some("/lib"), Some(root.id), 0).unwrap();
        let err = engine.submit("scan /lib", TaskKind::Scan, Some("/lib"), Some(root.id), 0).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        engine.finish(first.id, TaskStatus::Completed, None).unwrap();
        assert!(engine.submit("scan /lib", TaskKind::Scan, Some("/lib"), Some(root.id), 0).is_ok());
    }

    #[test]
    fn cancel_is_refused_once_terminal() {
        let db = Catalog::open_in_memory().unwrap();
        let engine = TaskEngine::new(db);
        let t = engine.submit("scan", TaskKind::Scan, None, None, 0).unwrap();
        engine.finish(t.id, TaskStatus::Completed, None).unwrap();
        assert!(engine.request_cancel(t.id).is_err());
    }

    #[test]
    fn throttle_only_allows_one_check_per_interval() {
        let mut throttle = CancelThrottle::new(50);
        assert!(!throttle.should_check());
        std::thread::sleep(std::time::Duration::from_millis(60));
        assert!(throttle.should_check());
        assert!(!throttle.should_check());
    }
}
