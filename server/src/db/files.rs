//! File and library-root operations.

use manga_core::model::{File, Integrity, LibraryRoot, ReadingStatus};
use rusqlite::{params, OptionalExtension, Row};

use super::{now_unix, Catalog, MAX_BATCH_ROWS};
use crate::error::AppError;

fn reading_status_to_str(s: ReadingStatus) -> &'static str {
    match s {
        ReadingStatus::Unread => "unread",
        ReadingStatus::InProgress => "in_progress",
        ReadingStatus::Finished => "finished",
    }
}

fn reading_status_from_str(s: &str) -> ReadingStatus {
    match s {
        "in_progress" => ReadingStatus::InProgress,
        "finished" => ReadingStatus::Finished,
        _ => ReadingStatus::Unread,
    }
}

fn integrity_to_str(i: Integrity) -> &'static str {
    match i {
        Integrity::Unknown => "unknown",
        Integrity::Ok => "ok",
        Integrity::Corrupted => "corrupted",
    }
}

fn integrity_from_str(s: &str) -> Integrity {
    match s {
        "ok" => Integrity::Ok,
        "corrupted" => Integrity::Corrupted,
        _ => Integrity::Unknown,
    }
}

fn row_to_file(row: &Row) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get("id")?,
        path: row.get("path")?,
        library_root_id: row.get("library_root_id")?,
        size_bytes: row.get("size_bytes")?,
        mtime: row.get("mtime")?,
        total_pages: row.get("total_pages")?,
        content_hash: row.get("content_hash")?,
        added_at: row.get("added_at")?,
        last_read_page: row.get("last_read_page")?,
        last_read_at: row.get("last_read_at")?,
        reading_status: reading_status_from_str(&row.get::<_, String>("reading_status")?),
        is_missing: row.get::<_, i64>("is_missing")? != 0,
        integrity: integrity_from_str(&row.get::<_, String>("integrity")?),
        cover_updated_at: row.get("cover_updated_at")?,
    })
}

fn row_to_root(row: &Row) -> rusqlite::Result<LibraryRoot> {
    Ok(LibraryRoot { id: row.get("id")?, path: row.get("path")?, added_at: row.get("added_at")? })
}

/// Filters accepted by `GET /files`; unset fields are not applied.
#[derive(Debug, Default, Clone)]
pub struct FileListFilter {
    pub keyword: Option<String>,
    pub tag_ids: Vec<i64>,
    pub exclude_tag_ids: Vec<i64>,
    pub tag_mode_all: bool,
    pub statuses: Vec<ReadingStatus>,
    pub liked: Option<bool>,
    pub min_pages: Option<i32>,
    pub max_pages: Option<i32>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub is_missing: Option<bool>,
    pub include_missing: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum SortBy {
    AddDate,
    FilePath,
    FileSize,
    TotalPages,
    LastReadDate,
    LastReadPage,
    ReadingStatus,
    Random,
}

impl Catalog {
    pub fn create_library_root(&self, normalized_path: &str) -> Result<LibraryRoot, AppError> {
        self.with_conn(|conn| {
            let existing: Option<i64> = conn
                .query_row("SELECT id FROM library_roots WHERE path = ?1", params![normalized_path], |r| r.get(0))
                .optional()?;
            if let Some(id) = existing {
                return conn.query_row(
                    "SELECT * FROM library_roots WHERE id = ?1",
                    params![id],
                    row_to_root,
                );
            }
            let added_at = now_unix();
            conn.execute(
                "INSERT INTO library_roots (path, added_at) VALUES (?1, ?2)",
                params![normalized_path, added_at],
            )?;
            let id = conn.last_insert_rowid();
            Ok(LibraryRoot { id, path: normalized_path.to_string(), added_at })
        })
        .map_err(|e: AppError| match e {
            AppError::Internal(m) if m.contains("UNIQUE") => {
                AppError::Conflict("library root already exists".into())
            }
            other => other,
        })
    }

    pub fn list_library_roots(&self) -> Result<Vec<LibraryRoot>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM library_roots ORDER BY id")?;
            let rows = stmt.query_map([], row_to_root)?;
            rows.collect()
        })
    }

    pub fn delete_library_root(&self, id: i64) -> Result<(), AppError> {
        self.with_conn(|conn| conn.execute("DELETE FROM library_roots WHERE id = ?1", params![id]))?;
        Ok(())
    }

    pub fn get_file(&self, id: i64) -> Result<Option<File>, AppError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT * FROM files WHERE id = ?1", params![id], row_to_file).optional()
        })
    }

    pub fn get_file_by_path(&self, path: &str) -> Result<Option<File>, AppError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT * FROM files WHERE path = ?1", params![path], row_to_file).optional()
        })
    }

    /// All (non-missing or missing, caller's choice) file rows for one
    /// library root, used by the scanner's reconciliation pass.
    pub fn list_files_for_root(&self, root_id: i64) -> Result<Vec<File>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM files WHERE library_root_id = ?1")?;
            let rows = stmt.query_map(params![root_id], row_to_file)?;
            rows.collect()
        })
    }

    /// Single missing row matching `root_id` + `content_hash`, used for
    /// move/rename adoption. Callers must first confirm the candidate
    /// count is exactly one before calling this.
    pub fn find_missing_by_hash(&self, root_id: i64, content_hash: &str) -> Result<Vec<File>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM files WHERE library_root_id = ?1 AND is_missing = 1 AND content_hash = ?2",
            )?;
            let rows = stmt.query_map(params![root_id, content_hash], row_to_file)?;
            rows.collect()
        })
    }

    pub fn insert_file(&self, f: &File) -> Result<i64, AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (path, library_root_id, size_bytes, mtime, total_pages, content_hash,
                    added_at, last_read_page, last_read_at, reading_status, is_missing, integrity, cover_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    f.path,
                    f.library_root_id,
                    f.size_bytes,
                    f.mtime,
                    f.total_pages,
                    f.content_hash,
                    f.added_at,
                    f.last_read_page,
                    f.last_read_at,
                    reading_status_to_str(f.reading_status),
                    f.is_missing as i64,
                    integrity_to_str(f.integrity),
                    f.cover_updated_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Update the metadata fields the scanner's analysis phase produces,
    /// leaving reading progress and tags untouched.
    pub fn update_file_metadata(
        &self,
        id: i64,
        size_bytes: i64,
        mtime: i64,
        total_pages: i32,
        content_hash: Option<&str>,
    ) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE files SET size_bytes = ?2, mtime = ?3, total_pages = ?4, content_hash = ?5,
                    is_missing = 0 WHERE id = ?1",
                params![id, size_bytes, mtime, total_pages, content_hash],
            )
        })?;
        Ok(())
    }

    /// Adopt a previously-missing row at its new path, per move/rename
    /// recovery: update path and metadata, clear `is_missing`.
    pub fn adopt_file(
        &self,
        id: i64,
        new_path: &str,
        size_bytes: i64,
        mtime: i64,
        total_pages: i32,
    ) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE files SET path = ?2, size_bytes = ?3, mtime = ?4, total_pages = ?5, is_missing = 0
                 WHERE id = ?1",
                params![id, new_path, size_bytes, mtime, total_pages],
            )
        })?;
        Ok(())
    }

    pub fn update_file_path(&self, id: i64, new_path: &str) -> Result<(), AppError> {
        self.with_conn(|conn| conn.execute("UPDATE files SET path = ?2 WHERE id = ?1", params![id, new_path]))?;
        Ok(())
    }

    /// `reading_status` follows from the page alone: `total_pages-1`
    /// transitions to finished, page `0` with no prior progress is
    /// unread, anything else is in_progress.
    pub fn update_reading_progress(&self, id: i64, page: i32) -> Result<(), AppError> {
        self.with_conn(|conn| {
            let total_pages: i32 =
                conn.query_row("SELECT total_pages FROM files WHERE id = ?1", params![id], |r| r.get(0))?;
            let clamped = page.clamp(0, total_pages.max(1) - 1);
            let status = if clamped >= total_pages - 1 && total_pages > 0 {
                "finished"
            } else if clamped > 0 {
                "in_progress"
            } else {
                "unread"
            };
            conn.execute(
                "UPDATE files SET last_read_page = ?2, last_read_at = ?3, reading_status = ?4 WHERE id = ?1",
                params![id, clamped, now_unix(), status],
            )
        })?;
        Ok(())
    }

    /// Set `reading_status` directly, independent of page position — used
    /// when a PATCH supplies `reading_status` without `last_read_page`.
    pub fn set_reading_status(&self, id: i64, status: ReadingStatus) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE files SET reading_status = ?2 WHERE id = ?1",
                params![id, reading_status_to_str(status)],
            )
        })?;
        Ok(())
    }

    /// Mark a batch of paths (for one root) missing or reappeared, in
    /// chunks bounded by [`MAX_BATCH_ROWS`].
    pub fn set_missing_for_paths(&self, paths: &[String], missing: bool) -> Result<(), AppError> {
        for chunk in paths.chunks(MAX_BATCH_ROWS) {
            self.with_conn_mut(|conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare("UPDATE files SET is_missing = ?1 WHERE path = ?2")?;
                    for path in chunk {
                        stmt.execute(params![missing as i64, path])?;
                    }
                }
                tx.commit()
            })?;
        }
        Ok(())
    }

    pub fn set_cover_updated_batch(&self, ids: &[i64]) -> Result<(), AppError> {
        let now = now_unix();
        for chunk in ids.chunks(MAX_BATCH_ROWS) {
            self.with_conn_mut(|conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare("UPDATE files SET cover_updated_at = ?1 WHERE id = ?2")?;
                    for id in chunk {
                        stmt.execute(params![now, id])?;
                    }
                }
                tx.commit()
            })?;
        }
        Ok(())
    }

    pub fn set_integrity(&self, id: i64, integrity: Integrity) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE files SET integrity = ?2 WHERE id = ?1",
                params![id, integrity_to_str(integrity)],
            )
        })?;
        Ok(())
    }

    /// Files whose last integrity check (run by the dedicated integrity
    /// task, never implicitly by the scanner) landed at `integrity`, for
    /// `GET /integrity-checks` to consult without re-running anything.
    pub fn list_files_by_integrity(&self, integrity: Integrity) -> Result<Vec<File>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM files WHERE integrity = ?1")?;
            let rows = stmt.query_map(params![integrity_to_str(integrity)], row_to_file)?;
            rows.collect()
        })
    }

    pub fn list_all_file_ids(&self) -> Result<Vec<i64>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM files WHERE is_missing = 0")?;
            let rows = stmt.query_map([], |r| r.get(0))?;
            rows.collect()
        })
    }

    pub fn delete_files_hard(&self, ids: &[i64]) -> Result<(), AppError> {
        for chunk in ids.chunks(MAX_BATCH_ROWS) {
            self.with_conn_mut(|conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare("DELETE FROM files WHERE id = ?1")?;
                    for id in chunk {
                        stmt.execute(params![id])?;
                    }
                }
                tx.commit()
            })?;
        }
        Ok(())
    }

    /// List files with the filter set `GET /files` exposes. Pagination
    /// is applied by the caller's already-clamped `page`/`per_page`.
    /// `keyword` is whitespace-split into tokens and ANDed: each token
    /// must appear as a substring of `path`.
    pub fn list_files(
        &self,
        filter: &FileListFilter,
        sort_by: SortBy,
        ascending: bool,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<File>, i64), AppError> {
        self.with_conn(|conn| {
            let mut where_clauses = Vec::new();
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if !filter.include_missing && filter.is_missing.is_none() {
                where_clauses.push("is_missing = 0".to_string());
            }
            if let Some(missing) = filter.is_missing {
                where_clauses.push("is_missing = ?".to_string());
                args.push(Box::new(missing as i64));
            }
            if let Some(keyword) = &filter.keyword {
                for token in keyword.split_whitespace() {
                    where_clauses.push("path LIKE ?".to_string());
                    args.push(Box::new(format!("%{token}%")));
                }
            }
            if let Some(liked) = filter.liked {
                if liked {
                    where_clauses.push("id IN (SELECT file_id FROM likes)".to_string());
                } else {
                    where_clauses.push("id NOT IN (SELECT file_id FROM likes)".to_string());
                }
            }
            if let Some(min_pages) = filter.min_pages {
                where_clauses.push("total_pages >= ?".to_string());
                args.push(Box::new(min_pages));
            }
            if let Some(max_pages) = filter.max_pages {
                where_clauses.push("total_pages <= ?".to_string());
                args.push(Box::new(max_pages));
            }
            if let Some(min_size) = filter.min_size {
                where_clauses.push("size_bytes >= ?".to_string());
                args.push(Box::new(min_size));
            }
            if let Some(max_size) = filter.max_size {
                where_clauses.push("size_bytes <= ?".to_string());
                args.push(Box::new(max_size));
            }
            if !filter.statuses.is_empty() {
                let placeholders = filter.statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                where_clauses.push(format!("reading_status IN ({placeholders})"));
                for s in &filter.statuses {
                    args.push(Box::new(reading_status_to_str(*s).to_string()));
                }
            }
            if !filter.tag_ids.is_empty() {
                let placeholders = filter.tag_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                if filter.tag_mode_all {
                    where_clauses.push(format!(
                        "(SELECT COUNT(DISTINCT tag_id) FROM file_tags ft WHERE ft.file_id = files.id AND ft.tag_id IN ({placeholders})) = {}",
                        filter.tag_ids.len()
                    ));
                } else {
                    where_clauses.push(format!(
                        "id IN (SELECT file_id FROM file_tags WHERE tag_id IN ({placeholders}))"
                    ));
                }
                for id in &filter.tag_ids {
                    args.push(Box::new(*id));
                }
            }
            if !filter.exclude_tag_ids.is_empty() {
                let placeholders = filter.exclude_tag_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                where_clauses.push(format!(
                    "id NOT IN (SELECT file_id FROM file_tags WHERE tag_id IN ({placeholders}))"
                ));
                for id in &filter.exclude_tag_ids {
                    args.push(Box::new(*id));
                }
            }

            let where_sql = if where_clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", where_clauses.join(" AND "))
            };

            let count_sql = format!("SELECT COUNT(*) FROM files {where_sql}");
            let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
            let total: i64 = conn.query_row(&count_sql, param_refs.as_slice(), |r| r.get(0))?;

            let order_col = match sort_by {
                SortBy::AddDate => "added_at",
                SortBy::FilePath => "path",
                SortBy::FileSize => "size_bytes",
                SortBy::TotalPages => "total_pages",
                SortBy::LastReadDate => "last_read_at",
                SortBy::LastReadPage => "last_read_page",
                SortBy::ReadingStatus => "reading_status",
                SortBy::Random => "RANDOM()",
            };
            let dir = if ascending { "ASC" } else { "DESC" };
            let order_sql = if matches!(sort_by, SortBy::Random) {
                "ORDER BY RANDOM()".to_string()
            } else {
                format!("ORDER BY {order_col} {dir}")
            };

            let offset = (page - 1).max(0) * per_page;
            let list_sql = format!("SELECT * FROM files {where_sql} {order_sql} LIMIT {per_page} OFFSET {offset}");
            let mut stmt = conn.prepare(&list_sql)?;
            let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(param_refs.as_slice(), row_to_file)?;
            let files: Vec<File> = rows.collect::<rusqlite::Result<_>>()?;

            Ok((files, total))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file(path: &str, root_id: i64) -> File {
        File {
            id: 0,
            path: path.to_string(),
            library_root_id: root_id,
            size_bytes: 100,
            mtime: 1000,
            total_pages: 10,
            content_hash: Some("abc".into()),
            added_at: now_unix(),
            last_read_page: 0,
            last_read_at: None,
            reading_status: ReadingStatus::Unread,
            is_missing: false,
            integrity: Integrity::Unknown,
            cover_updated_at: None,
        }
    }

    #[test]
    fn creating_same_root_twice_is_idempotent() {
        let db = Catalog::open_in_memory().unwrap();
        let a = db.create_library_root("/lib").unwrap();
        let b = db.create_library_root("/lib").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(db.list_library_roots().unwrap().len(), 1);
    }

    #[test]
    fn insert_and_fetch_roundtrip() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let id = db.insert_file(&sample_file("/lib/a.zip", root.id)).unwrap();
        let fetched = db.get_file(id).unwrap().unwrap();
        assert_eq!(fetched.path, "/lib/a.zip");
        assert_eq!(fetched.total_pages, 10);
    }

    #[test]
    fn reading_progress_clamps_and_marks_finished() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let id = db.insert_file(&sample_file("/lib/a.zip", root.id)).unwrap();

        db.update_reading_progress(id, 9).unwrap();
        let f = db.get_file(id).unwrap().unwrap();
        assert_eq!(f.last_read_page, 9);
        assert_eq!(f.reading_status, ReadingStatus::Finished);

        db.update_reading_progress(id, 999).unwrap();
        let f = db.get_file(id).unwrap().unwrap();
        assert_eq!(f.last_read_page, 9);
    }

    #[test]
    fn missing_batch_update_roundtrips() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        db.insert_file(&sample_file("/lib/a.zip", root.id)).unwrap();

        db.set_missing_for_paths(&["/lib/a.zip".to_string()], true).unwrap();
        let f = db.get_file_by_path("/lib/a.zip").unwrap().unwrap();
        assert!(f.is_missing);

        db.set_missing_for_paths(&["/lib/a.zip".to_string()], false).unwrap();
        let f = db.get_file_by_path("/lib/a.zip").unwrap().unwrap();
        assert!(!f.is_missing);
    }

    #[test]
    fn keyword_filter_ands_whitespace_separated_tokens() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        db.insert_file(&sample_file("/lib/One Piece v01.zip", root.id)).unwrap();
        db.insert_file(&sample_file("/lib/One Piece v02.zip", root.id)).unwrap();
        db.insert_file(&sample_file("/lib/Naruto v01.zip", root.id)).unwrap();

        let filter = FileListFilter { keyword: Some("one v01".to_string()), ..Default::default() };
        let (files, total) = db.list_files(&filter, SortBy::FilePath, true, 1, 50).unwrap();
        assert_eq!(total, 1);
        assert_eq!(files[0].path, "/lib/One Piece v01.zip");
    }

    #[test]
    fn adoption_requires_exactly_one_hash_match() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let mut f = sample_file("/lib/a.zip", root.id);
        f.is_missing = true;
        db.insert_file(&f).unwrap();

        let candidates = db.find_missing_by_hash(root.id, "abc").unwrap();
        assert_eq!(candidates.len(), 1);

        let mut f2 = sample_file("/lib/b.zip", root.id);
        f2.is_missing = true;
        db.insert_file(&f2).unwrap();
        let candidates = db.find_missing_by_hash(root.id, "abc").unwrap();
        assert_eq!(candidates.len(), 2);
    }
}
