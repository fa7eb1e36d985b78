//! Tag, tag-type, and alias operations, plus the file<->tag relation.

use manga_core::model::{Tag, TagType};
use rusqlite::{params, OptionalExtension, Row};

use super::Catalog;
use crate::error::AppError;

fn row_to_tag_type(row: &Row) -> rusqlite::Result<TagType> {
    Ok(TagType { id: row.get("id")?, name: row.get("name")?, sort_order: row.get("sort_order")? })
}

fn row_to_tag_shallow(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        tag_type_id: row.get("tag_type_id")?,
        parent_id: row.get("parent_id")?,
        color: row.get("color")?,
        favorite: row.get::<_, i64>("favorite")? != 0,
        description: row.get("description")?,
        aliases: Vec::new(),
    })
}

impl Catalog {
    pub fn create_tag_type(&self, name: &str, sort_order: i32) -> Result<TagType, AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tag_types (name, sort_order) VALUES (?1, ?2)",
                params![name, sort_order],
            )?;
            let id = conn.last_insert_rowid();
            Ok(TagType { id, name: name.to_string(), sort_order })
        })
    }

    pub fn list_tag_types(&self) -> Result<Vec<TagType>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM tag_types ORDER BY sort_order, name")?;
            let rows = stmt.query_map([], row_to_tag_type)?;
            rows.collect()
        })
    }

    pub fn get_tag_type_by_name(&self, name: &str) -> Result<Option<TagType>, AppError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT * FROM tag_types WHERE name = ?1 COLLATE NOCASE", params![name], row_to_tag_type)
                .optional()
        })
    }

    /// Refused (`Conflict`) while any tag still references this type.
    pub fn delete_tag_type(&self, id: i64) -> Result<(), AppError> {
        let in_use: i64 = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM tags WHERE tag_type_id = ?1", params![id], |r| r.get(0))
        })?;
        if in_use > 0 {
            return Err(AppError::Conflict("tag type is still referenced by tags".into()));
        }
        self.with_conn(|conn| conn.execute("DELETE FROM tag_types WHERE id = ?1", params![id]))?;
        Ok(())
    }

    fn load_aliases(&self, tag_id: i64) -> Result<Vec<String>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT alias FROM tag_aliases WHERE tag_id = ?1 ORDER BY alias")?;
            let rows = stmt.query_map(params![tag_id], |r| r.get::<_, String>(0))?;
            rows.collect()
        })
    }

    pub fn get_tag(&self, id: i64) -> Result<Option<Tag>, AppError> {
        let shallow = self.with_conn(|conn| {
            conn.query_row("SELECT * FROM tags WHERE id = ?1", params![id], row_to_tag_shallow).optional()
        })?;
        match shallow {
            Some(mut tag) => {
                tag.aliases = self.load_aliases(tag.id)?;
                Ok(Some(tag))
            }
            None => Ok(None),
        }
    }

    /// Case-insensitive lookup by tag name OR any of its aliases, used
    /// by the scanner's candidate-tag resolution and by the tag-index
    /// resync after rename/bulk-tag operations.
    pub fn resolve_tag_by_name_or_alias(&self, name: &str) -> Result<Option<Tag>, AppError> {
        let shallow = self.with_conn(|conn| {
            conn.query_row("SELECT * FROM tags WHERE name = ?1 COLLATE NOCASE", params![name], row_to_tag_shallow)
                .optional()
        })?;
        if let Some(mut tag) = shallow {
            tag.aliases = self.load_aliases(tag.id)?;
            return Ok(Some(tag));
        }

        let via_alias: Option<i64> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT tag_id FROM tag_aliases WHERE alias = ?1 COLLATE NOCASE",
                params![name],
                |r| r.get(0),
            )
            .optional()
        })?;
        match via_alias {
            Some(tag_id) => self.get_tag(tag_id),
            None => Ok(None),
        }
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>, AppError> {
        let shallow: Vec<Tag> = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM tags ORDER BY name")?;
            let rows = stmt.query_map([], row_to_tag_shallow)?;
            rows.collect()
        })?;
        shallow
            .into_iter()
            .map(|mut t| {
                t.aliases = self.load_aliases(t.id)?;
                Ok(t)
            })
            .collect()
    }

    /// Create a tag, rejecting if the name collides (case-insensitively)
    /// with an existing tag name or alias — the two namespaces are
    /// shared and globally unique.
    pub fn create_tag(&self, name: &str, tag_type_id: i64, parent_id: Option<i64>) -> Result<Tag, AppError> {
        if self.resolve_tag_by_name_or_alias(name)?.is_some() {
            return Err(AppError::Conflict(format!("tag name '{name}' already in use")));
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tags (name, tag_type_id, parent_id, favorite) VALUES (?1, ?2, ?3, 0)",
                params![name, tag_type_id, parent_id],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Tag {
                id,
                name: name.to_string(),
                tag_type_id,
                parent_id,
                color: None,
                favorite: false,
                description: None,
                aliases: Vec::new(),
            })
        })
    }

    pub fn add_alias(&self, tag_id: i64, alias: &str) -> Result<i64, AppError> {
        if self.resolve_tag_by_name_or_alias(alias)?.is_some() {
            return Err(AppError::Conflict(format!("alias '{alias}' collides with an existing tag or alias")));
        }
        self.with_conn(|conn| {
            conn.execute("INSERT INTO tag_aliases (tag_id, alias) VALUES (?1, ?2)", params![tag_id, alias])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn remove_alias(&self, alias_id: i64) -> Result<(), AppError> {
        self.with_conn(|conn| conn.execute("DELETE FROM tag_aliases WHERE id = ?1", params![alias_id]))?;
        Ok(())
    }

    pub fn list_aliases_for_tag(&self, tag_id: i64) -> Result<Vec<(i64, String)>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, alias FROM tag_aliases WHERE tag_id = ?1 ORDER BY alias")?;
            let rows = stmt.query_map(params![tag_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
            rows.collect()
        })
    }

    pub fn rename_tag(&self, tag_id: i64, new_name: &str) -> Result<(), AppError> {
        self.with_conn(|conn| conn.execute("UPDATE tags SET name = ?2 WHERE id = ?1", params![tag_id, new_name]))?;
        Ok(())
    }

    /// Update the mutable descriptive fields of a tag (everything but
    /// its name, which goes through [`Catalog::rename_tag`] so the
    /// uniqueness check stays in one place). `None` leaves a field
    /// untouched.
    pub fn update_tag_fields(
        &self,
        tag_id: i64,
        color: Option<&str>,
        favorite: Option<bool>,
        description: Option<&str>,
        parent_id: Option<Option<i64>>,
    ) -> Result<(), AppError> {
        self.with_conn(|conn| {
            if let Some(color) = color {
                conn.execute("UPDATE tags SET color = ?2 WHERE id = ?1", params![tag_id, color])?;
            }
            if let Some(favorite) = favorite {
                conn.execute("UPDATE tags SET favorite = ?2 WHERE id = ?1", params![tag_id, favorite as i64])?;
            }
            if let Some(description) = description {
                conn.execute("UPDATE tags SET description = ?2 WHERE id = ?1", params![tag_id, description])?;
            }
            if let Some(parent_id) = parent_id {
                conn.execute("UPDATE tags SET parent_id = ?2 WHERE id = ?1", params![tag_id, parent_id])?;
            }
            Ok(())
        })
    }

    /// Every alias across every tag, for the flat `GET /tag-aliases`
    /// listing (as opposed to [`Catalog::list_aliases_for_tag`], scoped
    /// to one tag).
    pub fn list_all_aliases(&self) -> Result<Vec<(i64, i64, String)>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, tag_id, alias FROM tag_aliases ORDER BY alias")?;
            let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
            rows.collect()
        })
    }

    pub fn delete_tag(&self, tag_id: i64) -> Result<(), AppError> {
        self.with_conn(|conn| conn.execute("DELETE FROM tags WHERE id = ?1", params![tag_id]))?;
        Ok(())
    }

    /// Merge `source` into `target`: repoint file associations, fold
    /// `source`'s aliases (plus its own name) into `target`, then delete
    /// `source`.
    pub fn merge_tag_into(&self, source_id: i64, target_id: i64) -> Result<(), AppError> {
        let source = self.get_tag(source_id)?.ok_or_else(|| AppError::NotFound("source tag".into()))?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO file_tags (file_id, tag_id)
                 SELECT file_id, ?1 FROM file_tags WHERE tag_id = ?2",
                params![target_id, source_id],
            )?;
            tx.execute("DELETE FROM file_tags WHERE tag_id = ?1", params![source_id])?;
            tx.execute(
                "INSERT OR IGNORE INTO tag_aliases (tag_id, alias) VALUES (?1, ?2)",
                params![target_id, source.name],
            )?;
            tx.execute(
                "UPDATE OR IGNORE tag_aliases SET tag_id = ?1 WHERE tag_id = ?2",
                params![target_id, source_id],
            )?;
            tx.execute("DELETE FROM tags WHERE id = ?1", params![source_id])?;
            tx.commit()
        })?;
        Ok(())
    }

    pub fn list_tags_for_file(&self, file_id: i64) -> Result<Vec<Tag>, AppError> {
        let ids: Vec<i64> = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT tag_id FROM file_tags WHERE file_id = ?1")?;
            let rows = stmt.query_map(params![file_id], |r| r.get(0))?;
            rows.collect()
        })?;
        ids.into_iter().filter_map(|id| self.get_tag(id).transpose()).collect()
    }

    pub fn attach_tag(&self, file_id: i64, tag_id: i64) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute("INSERT OR IGNORE INTO file_tags (file_id, tag_id) VALUES (?1, ?2)", params![file_id, tag_id])
        })?;
        Ok(())
    }

    pub fn detach_tag(&self, file_id: i64, tag_id: i64) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM file_tags WHERE file_id = ?1 AND tag_id = ?2", params![file_id, tag_id])
        })?;
        Ok(())
    }

    pub fn set_file_tags(&self, file_id: i64, tag_ids: &[i64]) -> Result<(), AppError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM file_tags WHERE file_id = ?1", params![file_id])?;
            {
                let mut stmt = tx.prepare("INSERT INTO file_tags (file_id, tag_id) VALUES (?1, ?2)")?;
                for tag_id in tag_ids {
                    stmt.execute(params![file_id, tag_id])?;
                }
            }
            tx.commit()
        })?;
        Ok(())
    }

    /// Expand a set of tag ids to include every descendant in each tag's
    /// parent-edge forest, for the `include_descendants` file-list filter.
    /// Cycle-safe even though [`Catalog::update_tag_fields`] already
    /// refuses to create one: a tag already visited is never re-expanded.
    pub fn expand_tag_ids_with_descendants(&self, tag_ids: &[i64]) -> Result<Vec<i64>, AppError> {
        let children: Vec<(i64, i64)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, parent_id FROM tags WHERE parent_id IS NOT NULL")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?;
            rows.collect()
        })?;

        let mut result: std::collections::BTreeSet<i64> = tag_ids.iter().copied().collect();
        let mut frontier: Vec<i64> = tag_ids.to_vec();
        while let Some(parent) = frontier.pop() {
            for &(child, child_parent) in &children {
                if child_parent == parent && result.insert(child) {
                    frontier.push(child);
                }
            }
        }
        Ok(result.into_iter().collect())
    }

    /// File ids whose path contains a bracketed token for `tag.name` or
    /// any of its aliases, used by the tag file-change task to find
    /// every file that needs its basename rewritten.
    pub fn files_matching_tag_tokens(&self, patterns: &[String]) -> Result<Vec<i64>, AppError> {
        self.with_conn(|conn| {
            let mut ids = std::collections::BTreeSet::new();
            for pattern in patterns {
                let token = format!("%[{pattern}]%");
                let mut stmt = conn.prepare("SELECT id FROM files WHERE path LIKE ?1")?;
                let rows = stmt.query_map(params![token], |r| r.get::<_, i64>(0))?;
                for id in rows {
                    ids.insert(id?);
                }
            }
            Ok(ids.into_iter().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_name_alias_namespace_is_shared() {
        let db = Catalog::open_in_memory().unwrap();
        let tt = db.create_tag_type("genre", 0).unwrap();
        let tag = db.create_tag("Action", tt.id, None).unwrap();
        db.add_alias(tag.id, "Act").unwrap();

        assert!(db.create_tag("Act", tt.id, None).is_err());
        assert!(db.create_tag("action", tt.id, None).is_err());
    }

    #[test]
    fn resolve_finds_by_alias_case_insensitively() {
        let db = Catalog::open_in_memory().unwrap();
        let tt = db.create_tag_type("genre", 0).unwrap();
        let tag = db.create_tag("Action", tt.id, None).unwrap();
        db.add_alias(tag.id, "Act").unwrap();

        let found = db.resolve_tag_by_name_or_alias("act").unwrap().unwrap();
        assert_eq!(found.id, tag.id);
    }

    #[test]
    fn delete_tag_type_refused_while_referenced() {
        let db = Catalog::open_in_memory().unwrap();
        let tt = db.create_tag_type("genre", 0).unwrap();
        db.create_tag("Action", tt.id, None).unwrap();
        assert!(db.delete_tag_type(tt.id).is_err());
    }

    #[test]
    fn expand_descendants_walks_the_whole_subtree() {
        let db = Catalog::open_in_memory().unwrap();
        let tt = db.create_tag_type("series", 0).unwrap();
        let root = db.create_tag("Shounen", tt.id, None).unwrap();
        let child = db.create_tag("Action", tt.id, Some(root.id)).unwrap();
        let grandchild = db.create_tag("Shounen Battle", tt.id, Some(child.id)).unwrap();
        let unrelated = db.create_tag("Romance", tt.id, None).unwrap();

        let expanded = db.expand_tag_ids_with_descendants(&[root.id]).unwrap();
        assert!(expanded.contains(&root.id));
        assert!(expanded.contains(&child.id));
        assert!(expanded.contains(&grandchild.id));
        assert!(!expanded.contains(&unrelated.id));
    }

    #[test]
    fn merge_folds_aliases_and_moves_associations() {
        let db = Catalog::open_in_memory().unwrap();
        let tt = db.create_tag_type("genre", 0).unwrap();
        let root = db.create_library_root("/lib").unwrap();
        let source = db.create_tag("Action", tt.id, None).unwrap();
        let target = db.create_tag("ActionMovies", tt.id, None).unwrap();

        let file = manga_core::model::File {
            id: 0,
            path: "/lib/a.zip".into(),
            library_root_id: root.id,
            size_bytes: 1,
            mtime: 1,
            total_pages: 1,
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
        db.attach_tag(file_id, source.id).unwrap();

        db.merge_tag_into(source.id, target.id).unwrap();

        let tags = db.list_tags_for_file(file_id).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, target.id);
        assert!(db.get_tag(source.id).unwrap().is_none());

        let merged_target = db.get_tag(target.id).unwrap().unwrap();
        assert!(merged_target.aliases.contains(&"Action".to_string()));
    }
}
