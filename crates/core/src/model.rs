//! Domain types shared by the catalog store, the scanner, and the HTTP
//! layer. These are plain data; persistence and validation logic live
//! with their respective components.

use serde::{Deserialize, Serialize};

/// Reading progress for a [`File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Unread,
    InProgress,
    Finished,
}

/// Result of the scanner's last integrity check on a file's archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrity {
    Unknown,
    Ok,
    Corrupted,
}

/// One archive on disk, tracked by the catalog.
///
/// Invariants: `0 <= last_read_page < max(1, total_pages)`; a missing
/// file's `reading_status` is left untouched when `is_missing` flips;
/// `path` is unique after case-normalization per platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub path: String,
    pub library_root_id: i64,
    pub size_bytes: i64,
    pub mtime: i64,
    pub total_pages: i32,
    pub content_hash: Option<String>,
    pub added_at: i64,
    pub last_read_page: i32,
    pub last_read_at: Option<i64>,
    pub reading_status: ReadingStatus,
    pub is_missing: bool,
    pub integrity: Integrity,
    pub cover_updated_at: Option<i64>,
}

impl File {
    /// Clamp a candidate page number into the file's valid range,
    /// per the `0 <= last_read_page < max(1, total_pages)` invariant.
    pub fn clamp_page(&self, page: i32) -> i32 {
        let upper = self.total_pages.max(1) - 1;
        page.clamp(0, upper)
    }
}

/// A canonical library root directory; unique across the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryRoot {
    pub id: i64,
    pub path: String,
    pub added_at: i64,
}

/// Grouping for [`Tag`] (e.g. "genre", "author", "series").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagType {
    pub id: i64,
    pub name: String,
    pub sort_order: i32,
}

/// A tag, case-insensitively unique by name, optionally nested under a
/// parent tag of the same type (forming a forest, no cycles allowed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub tag_type_id: i64,
    pub parent_id: Option<i64>,
    pub color: Option<String>,
    pub favorite: bool,
    pub description: Option<String>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub file_id: i64,
    pub page: i32,
    pub note: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub file_id: i64,
    pub added_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Scan,
    ScanAll,
    Rename,
    BulkTag,
    TagFileChange,
    TagSplit,
    MissingCleanup,
    IntegrityCheck,
}

/// A durable record of one background unit of work, tracked end to end
/// by the task engine. `status` transitions to a terminal state exactly
/// once; `finished_at` is set iff that transition has happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub kind: TaskKind,
    pub worker_handle: Option<String>,
    pub status: TaskStatus,
    pub progress_pct: u8,
    pub current_target: Option<String>,
    pub target_path: Option<String>,
    pub library_root_id: Option<i64>,
    pub total: i64,
    pub processed: i64,
    pub error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl Task {
    /// Recompute `progress_pct` from `processed`/`total`, saturating at
    /// 100 and never dividing by zero.
    pub fn recompute_progress(&mut self) {
        self.progress_pct = if self.total <= 0 {
            0
        } else {
            ((self.processed.min(self.total) * 100) / self.total).clamp(0, 100) as u8
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> File {
        File {
            id: 1,
            path: "/lib/a.zip".into(),
            library_root_id: 1,
            size_bytes: 100,
            mtime: 0,
            total_pages: 10,
            content_hash: None,
            added_at: 0,
            last_read_page: 0,
            last_read_at: None,
            reading_status: ReadingStatus::Unread,
            is_missing: false,
            integrity: Integrity::Unknown,
            cover_updated_at: None,
        }
    }

    #[test]
    fn clamp_page_respects_upper_bound() {
        let f = sample_file();
        assert_eq!(f.clamp_page(50), 9);
        assert_eq!(f.clamp_page(-5), 0);
    }

    #[test]
    fn clamp_page_handles_zero_pages() {
        let mut f = sample_file();
        f.total_pages = 0;
        assert_eq!(f.clamp_page(5), 0);
    }

    #[test]
    fn task_progress_saturates_and_avoids_division_by_zero() {
        let mut t = Task {
            id: 1,
            name: "scan".into(),
            kind: TaskKind::Scan,
            worker_handle: None,
            status: TaskStatus::Running,
            progress_pct: 0,
            current_target: None,
            target_path: None,
            library_root_id: None,
            total: 0,
            processed: 0,
            error: None,
            created_at: 0,
            started_at: None,
            finished_at: None,
        };
        t.recompute_progress();
        assert_eq!(t.progress_pct, 0);

        t.total = 10;
        t.processed = 25;
        t.recompute_progress();
        assert_eq!(t.progress_pct, 100);
    }

    #[test]
    fn terminal_states_are_recognized() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}
