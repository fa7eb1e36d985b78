//! Catalog store (C5): a `rusqlite` connection wrapped in a
//! `parking_lot::Mutex`, giving every writer a short, serialized
//! transaction while readers still go through the same connection
//! (SQLite's own locking handles the rest). Schema lives in
//! [`SCHEMA`]; each submodule owns one table family's operations.

pub mod bookmarks;
pub mod files;
pub mod settings;
pub mod tags;
pub mod tasks;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS library_roots (
    id INTEGER PRIMARY KEY,
    path TEXT UNIQUE NOT NULL,
    added_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    path TEXT UNIQUE NOT NULL,
    library_root_id INTEGER NOT NULL REFERENCES library_roots(id),
    size_bytes INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    total_pages INTEGER NOT NULL,
    content_hash TEXT,
    added_at INTEGER NOT NULL,
    last_read_page INTEGER NOT NULL DEFAULT 0,
    last_read_at INTEGER,
    reading_status TEXT NOT NULL DEFAULT 'unread',
    is_missing INTEGER NOT NULL DEFAULT 0,
    integrity TEXT NOT NULL DEFAULT 'unknown',
    cover_updated_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_files_root ON files(library_root_id);
CREATE INDEX IF NOT EXISTS idx_files_missing ON files(is_missing);
CREATE INDEX IF NOT EXISTS idx_files_hash ON files(content_hash);

CREATE TABLE IF NOT EXISTS tag_types (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL COLLATE NOCASE,
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL COLLATE NOCASE,
    tag_type_id INTEGER NOT NULL REFERENCES tag_types(id),
    parent_id INTEGER REFERENCES tags(id),
    color TEXT,
    favorite INTEGER NOT NULL DEFAULT 0,
    description TEXT
);

CREATE TABLE IF NOT EXISTS tag_aliases (
    id INTEGER PRIMARY KEY,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    alias TEXT UNIQUE NOT NULL COLLATE NOCASE
);

CREATE TABLE IF NOT EXISTS file_tags (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (file_id, tag_id)
);

CREATE TABLE IF NOT EXISTS bookmarks (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    page INTEGER NOT NULL,
    note TEXT,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (file_id, page)
);

CREATE TABLE IF NOT EXISTS likes (
    file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
    added_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    worker_handle TEXT,
    status TEXT NOT NULL,
    progress_pct INTEGER NOT NULL DEFAULT 0,
    current_target TEXT,
    target_path TEXT,
    library_root_id INTEGER,
    total INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    finished_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_root ON tasks(library_root_id);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Batch-commit boundary: task steps that mutate many files commit in
/// chunks this size to bound rollback scope on failure.
pub const MAX_BATCH_ROWS: usize = 500;

#[derive(Clone)]
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, AppError> {
        let guard = self.conn.lock();
        Ok(f(&guard)?)
    }

    pub(crate) fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, AppError> {
        let mut guard = self.conn.lock();
        Ok(f(&mut guard)?)
    }
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
