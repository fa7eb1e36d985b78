//! Bookmark and like operations. Both are simple relations owned by
//! their file (cascade-deleted with it).

use manga_core::model::{Bookmark, Like};
use rusqlite::{params, OptionalExtension, Row};

use super::{now_unix, Catalog};
use crate::error::AppError;

fn row_to_bookmark(row: &Row) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        file_id: row.get("file_id")?,
        page: row.get("page")?,
        note: row.get("note")?,
        created_at: row.get("created_at")?,
    })
}

impl Catalog {
    pub fn add_bookmark(&self, file_id: i64, page: i32, note: Option<&str>) -> Result<Bookmark, AppError> {
        let created_at = now_unix();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bookmarks (file_id, page, note, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![file_id, page, note, created_at],
            )
        })
        .map_err(|e: AppError| match e {
            AppError::Internal(m) if m.contains("UNIQUE") => {
                AppError::Conflict("bookmark already exists for this page".into())
            }
            other => other,
        })?;
        Ok(Bookmark { file_id, page, note: note.map(str::to_string), created_at })
    }

    pub fn remove_bookmark(&self, file_id: i64, page: i32) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM bookmarks WHERE file_id = ?1 AND page = ?2", params![file_id, page])
        })?;
        Ok(())
    }

    pub fn list_bookmarks(&self, file_id: i64) -> Result<Vec<Bookmark>, AppError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM bookmarks WHERE file_id = ?1 ORDER BY page")?;
            let rows = stmt.query_map(params![file_id], row_to_bookmark)?;
            rows.collect()
        })
    }

    pub fn set_liked(&self, file_id: i64, liked: bool) -> Result<(), AppError> {
        if liked {
            let added_at = now_unix();
            self.with_conn(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO likes (file_id, added_at) VALUES (?1, ?2)",
                    params![file_id, added_at],
                )
            })?;
        } else {
            self.with_conn(|conn| conn.execute("DELETE FROM likes WHERE file_id = ?1", params![file_id]))?;
        }
        Ok(())
    }

    pub fn get_like(&self, file_id: i64) -> Result<Option<Like>, AppError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT * FROM likes WHERE file_id = ?1", params![file_id], |r| {
                Ok(Like { file_id: r.get("file_id")?, added_at: r.get("added_at")? })
            })
            .optional()
        })
    }

    pub fn list_likes(&self) -> Result<Vec<Like>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM likes ORDER BY added_at DESC")?;
            let rows = stmt.query_map([], |r| Ok(Like { file_id: r.get("file_id")?, added_at: r.get("added_at")? }))?;
            rows.collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_bookmark_is_conflict() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let file = manga_core::model::File {
            id: 0,
            path: "/lib/a.zip".into(),
            library_root_id: root.id,
            size_bytes: 1,
            mtime: 1,
            total_pages: 5,
            content_hash: None,
            added_at: 0,
            last_read_page: 0,
            last_read_at: None,
            reading_status: manga_core::model::ReadingStatus::Unread,
            is_missing: false,
            integrity: manga_core::model::Integrity::Unknown,
            cover_updated_at: None,
        };
        let file_id = db.insert_file(&file).unwrap();

        db.add_bookmark(file_id, 2, None).unwrap();
        assert!(db.add_bookmark(file_id, 2, None).is_err());
    }

    #[test]
    fn like_is_idempotent() {
        let db = Catalog::open_in_memory().unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let file = manga_core::model::File {
            id: 0,
            path: "/lib/a.zip".into(),
            library_root_id: root.id,
            size_bytes: 1,
            mtime: 1,
            total_pages: 5,
            content_hash: None,
            added_at: 0,
            last_read_page: 0,
            last_read_at: None,
            reading_status: manga_core::model::ReadingStatus::Unread,
            is_missing: false,
            integrity: manga_core::model::Integrity::Unknown,
            cover_updated_at: None,
        };
        let file_id = db.insert_file(&file).unwrap();

        db.set_liked(file_id, true).unwrap();
        db.set_liked(file_id, true).unwrap();
        assert!(db.get_like(file_id).unwrap().is_some());

        db.set_liked(file_id, false).unwrap();
        assert!(db.get_like(file_id).unwrap().is_none());
    }
}
