//! Rename / tag mutator (C8): the disk-rename primitive shared by three
//! task kinds (batch rename by template, tag file-change, tag split),
//! plus the tag-index resync they all finish with.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use manga_core::model::TaskStatus;
use manga_core::tagging;
use tracing::warn;

use crate::db::Catalog;
use crate::error::AppError;
use crate::tasks::TaskEngine;

const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replace filesystem-hostile characters with `_`, applied to the stem
/// and extension independently so a hostile character can't smuggle a
/// different extension in.
pub fn sanitize_component(name: &str) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|s| s.to_str());

    let clean = |s: &str| s.chars().map(|c| if FORBIDDEN_CHARS.contains(&c) { '_' } else { c }).collect::<String>();

    match ext {
        Some(ext) => format!("{}.{}", clean(stem), clean(ext)),
        None => clean(stem),
    }
}

fn case_insensitive_platform() -> bool {
    cfg!(any(target_os = "windows", target_os = "macos"))
}

fn paths_equal_case_insensitive(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

/// The shared rename primitive: handles no-ops, parent-directory
/// creation, case-only renames on case-insensitive platforms (via a
/// temporary intermediate name), and a copy-and-delete fallback for
/// cross-volume moves.
pub fn rename(old: &Path, new: &Path) -> Result<(), AppError> {
    if old == new {
        return Ok(());
    }
    if let Some(parent) = new.parent() {
        fs::create_dir_all(parent)?;
    }

    if new.exists() {
        let same_target = old.canonicalize().ok().zip(new.canonicalize().ok()).map(|(a, b)| a == b).unwrap_or(false);
        if !same_target {
            return Err(AppError::TargetExists(new.display().to_string()));
        }
    }

    if case_insensitive_platform() && paths_equal_case_insensitive(old, new) && old != new {
        return rename_case_only(old, new);
    }

    match fs::rename(old, new) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(old = %old.display(), new = %new.display(), error = %e, "rename failed, falling back to copy+delete");
            copy_and_delete(old, new)
        }
    }
}

fn rename_case_only(old: &Path, new: &Path) -> Result<(), AppError> {
    let parent = old.parent().unwrap_or_else(|| Path::new("."));
    let base = old.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    let ext = Path::new(base).extension().and_then(|e| e.to_str()).map(|e| format!(".{e}")).unwrap_or_default();

    let mut n = 0;
    let tmp = loop {
        let name = if n == 0 { format!("{base}.__tmp_rename__{ext}") } else { format!("{base}.__tmp_rename___{n}{ext}") };
        let candidate = parent.join(name);
        if !candidate.exists() {
            break candidate;
        }
        n += 1;
    };

    fs::rename(old, &tmp)?;
    match fs::rename(&tmp, new) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::rename(&tmp, old);
            Err(e.into())
        }
    }
}

fn copy_and_delete(old: &Path, new: &Path) -> Result<(), AppError> {
    fs::copy(old, new)?;
    fs::remove_file(old)?;
    Ok(())
}

/// Recompute a file's tag associations from its basename's bracketed
/// tokens: attach every resolvable token, detach tags whose token is
/// gone. Unresolvable tokens (no matching tag/alias) are left as-is in
/// the filename but contribute nothing to the tag set.
pub fn resync_tags_for_file(db: &Catalog, file_id: i64, path: &str) -> Result<(), AppError> {
    let basename = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or("");
    let current = db.list_tags_for_file(file_id)?;
    let current_names: Vec<String> = current.iter().map(|t| t.name.clone()).collect();
    let diff = tagging::diff_against_basename(basename, &current_names);
    if diff.is_empty() {
        return Ok(());
    }
    for name in &diff.to_add {
        if let Some(tag) = db.resolve_tag_by_name_or_alias(name)? {
            db.attach_tag(file_id, tag.id)?;
        }
    }
    for name in &diff.to_remove {
        if let Some(tag) = db.resolve_tag_by_name_or_alias(name)? {
            db.detach_tag(file_id, tag.id)?;
        }
    }
    Ok(())
}

const TEMPLATE_TAG_TYPES: &[&str] = &["author", "series", "title", "volume_number", "year"];

/// Substitute `{id}`, `{title}`, the five well-known tag-type
/// placeholders, and `{custom_tag:<type>}` into `template`. Unresolved
/// placeholders are stripped rather than left verbatim.
fn render_template(template: &str, file_id: i64, title: &str, tags_by_type: &HashMap<String, Vec<String>>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let placeholder = &template[i + 1..i + end];
                let value = resolve_placeholder(placeholder, file_id, title, tags_by_type);
                out.push_str(&value);
                i += end + 1;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn resolve_placeholder(placeholder: &str, file_id: i64, title: &str, tags_by_type: &HashMap<String, Vec<String>>) -> String {
    if placeholder == "id" {
        return file_id.to_string();
    }
    if placeholder == "title" {
        return title.to_string();
    }
    let lower = placeholder.to_lowercase();
    if TEMPLATE_TAG_TYPES.contains(&lower.as_str()) {
        return tags_by_type.get(&lower).and_then(|v| v.first()).cloned().unwrap_or_default();
    }
    if let Some(type_name) = placeholder.strip_prefix("custom_tag:") {
        return tags_by_type.get(&type_name.to_lowercase()).and_then(|v| v.first()).cloned().unwrap_or_default();
    }
    String::new()
}

/// Join `root` with a template-substituted relative path, rejecting
/// anything that resolves outside `root` (absolute injections, `..`
/// escapes). Returns the full candidate path on success.
fn resolve_within_root(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = relative.replace('\\', "/").replace('/', std::path::MAIN_SEPARATOR_STR);
    let candidate = Path::new(&relative);
    if candidate.is_absolute() {
        return None;
    }
    let joined = root.join(candidate);
    let normalized = manga_core::path_normalize::normalize_file(&joined.to_string_lossy());
    let root_normalized = manga_core::path_normalize::normalize_file(&root.to_string_lossy());
    if !normalized.starts_with(&root_normalized) {
        return None;
    }
    Some(joined)
}

/// Batch rename by template: one small transaction per file, tallying
/// failures rather than aborting. Task status is `completed` only when
/// every file succeeded.
pub fn run_batch_rename(
    db: &Catalog,
    engine: &TaskEngine,
    task_id: i64,
    root_path: &str,
    file_ids: &[i64],
    template: &str,
) -> Result<(), AppError> {
    engine.mark_running(task_id)?;
    let root = Path::new(root_path);
    let total = file_ids.len() as i64;
    let mut failures = 0i64;

    let tag_type_names: HashMap<i64, String> =
        db.list_tag_types()?.into_iter().map(|t| (t.id, t.name.to_lowercase())).collect();

    for (n, &file_id) in file_ids.iter().enumerate() {
        let result = (|| -> Result<(), AppError> {
            let file = db.get_file(file_id)?.ok_or_else(|| AppError::NotFound("file".into()))?;
            let old_path = Path::new(&file.path);
            let ext = old_path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let title = old_path.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();

            let mut tags_by_type: HashMap<String, Vec<String>> = HashMap::new();
            for tag in db.list_tags_for_file(file_id)? {
                if let Some(type_name) = tag_type_names.get(&tag.tag_type_id) {
                    tags_by_type.entry(type_name.clone()).or_default().push(tag.name);
                }
            }

            let mut relative = render_template(template, file_id, &title, &tags_by_type);
            if !ext.is_empty() {
                relative = format!("{relative}.{ext}");
            }
            let sanitized: String = relative
                .split(['/', '\\'])
                .map(sanitize_component)
                .collect::<Vec<_>>()
                .join(std::path::MAIN_SEPARATOR_STR);

            let new_path = resolve_within_root(root, &sanitized)
                .ok_or_else(|| AppError::BadRequest("rendered path escapes library root".into()))?;

            rename(old_path, &new_path)?;
            let new_path_str = new_path.to_string_lossy().into_owned();
            db.update_file_path(file_id, &new_path_str)?;
            resync_tags_for_file(db, file_id, &new_path_str)?;
            Ok(())
        })();

        if result.is_err() {
            failures += 1;
        }
        engine.update_progress(task_id, n as i64 + 1, total, Some(&file_id.to_string()))?;
    }

    let status = if failures == 0 { TaskStatus::Completed } else { TaskStatus::Failed };
    let message = if failures == 0 { None } else { Some(format!("{failures}/{total} files failed to rename")) };
    engine.finish(task_id, status, message.as_deref())?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFileChangeAction {
    Delete,
    Rename,
}

/// Tag file-change: rewrite every file whose basename carries a
/// bracketed token for `tag` (or one of its aliases), then fold the
/// tag record itself (merge into an existing `new_name` tag, rename in
/// place, or delete).
pub fn run_tag_file_change(
    db: &Catalog,
    engine: &TaskEngine,
    task_id: i64,
    tag_id: i64,
    action: TagFileChangeAction,
    new_name: Option<&str>,
) -> Result<(), AppError> {
    engine.mark_running(task_id)?;
    let tag = db.get_tag(tag_id)?.ok_or_else(|| AppError::NotFound("tag".into()))?;
    let mut patterns = vec![tag.name.clone()];
    patterns.extend(tag.aliases.clone());

    let file_ids = db.files_matching_tag_tokens(&patterns)?;
    let total = file_ids.len() as i64;
    let mut failures = 0i64;
    let mut touched_paths = Vec::new();

    for (n, &file_id) in file_ids.iter().enumerate() {
        let result = (|| -> Result<(), AppError> {
            let file = db.get_file(file_id)?.ok_or_else(|| AppError::NotFound("file".into()))?;
            let old_path = Path::new(&file.path);
            let dir = old_path.parent().unwrap_or_else(|| Path::new("."));
            let basename = old_path.file_name().and_then(|n| n.to_str()).unwrap_or("");

            let mut new_basename = basename.to_string();
            for pattern in &patterns {
                let token = format!("[{pattern}]");
                let replacement = match action {
                    TagFileChangeAction::Delete => String::new(),
                    TagFileChangeAction::Rename => format!("[{}]", new_name.unwrap_or(&tag.name)),
                };
                new_basename = replace_case_insensitive(&new_basename, &token, &replacement);
            }
            let new_basename = collapse_whitespace(&new_basename);

            let new_path = dir.join(&new_basename);
            rename(old_path, &new_path)?;
            let new_path_str = new_path.to_string_lossy().into_owned();
            db.update_file_path(file_id, &new_path_str)?;
            touched_paths.push((file_id, new_path_str));
            Ok(())
        })();

        if result.is_err() {
            failures += 1;
        }
        engine.update_progress(task_id, n as i64 + 1, total, None)?;
    }

    if failures == 0 {
        match action {
            TagFileChangeAction::Delete => {
                db.delete_tag(tag_id)?;
            }
            TagFileChangeAction::Rename => {
                let new_name = new_name.unwrap_or(&tag.name);
                if new_name != tag.name {
                    if let Some(existing) = db.resolve_tag_by_name_or_alias(new_name)? {
                        if existing.id != tag_id {
                            db.merge_tag_into(tag_id, existing.id)?;
                        }
                    } else {
                        db.rename_tag(tag_id, new_name)?;
                        let _ = db.add_alias(tag_id, &tag.name);
                    }
                }
            }
        }
    }

    for (file_id, path) in &touched_paths {
        resync_tags_for_file(db, *file_id, path)?;
    }

    let status = if failures == 0 { TaskStatus::Completed } else { TaskStatus::Failed };
    let message = if failures == 0 { None } else { Some(format!("{failures}/{total} files failed")) };
    engine.finish(task_id, status, message.as_deref())?;
    Ok(())
}

/// Tag split: create (or reuse) one tag per `new_names` entry under the
/// source tag's type, rewrite every tagged file's bracket set, and
/// delete the source tag once every file succeeds.
pub fn run_tag_split(db: &Catalog, engine: &TaskEngine, task_id: i64, source_tag_id: i64, new_names: &[String]) -> Result<(), AppError> {
    engine.mark_running(task_id)?;
    let source = db.get_tag(source_tag_id)?.ok_or_else(|| AppError::NotFound("source tag".into()))?;

    let mut new_tag_ids = Vec::with_capacity(new_names.len());
    for name in new_names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            engine.finish(task_id, TaskStatus::Failed, Some("new tag names must be non-empty"))?;
            return Ok(());
        }
        match db.resolve_tag_by_name_or_alias(trimmed)? {
            Some(existing) if existing.tag_type_id != source.tag_type_id => {
                engine.finish(task_id, TaskStatus::Failed, Some(&format!("'{trimmed}' exists under a different tag type")))?;
                return Ok(());
            }
            Some(existing) => new_tag_ids.push(existing.id),
            None => new_tag_ids.push(db.create_tag(trimmed, source.tag_type_id, None)?.id),
        }
    }

    let mut patterns = vec![source.name.clone()];
    patterns.extend(source.aliases.clone());
    let file_ids = db.files_matching_tag_tokens(&patterns)?;
    let total = file_ids.len() as i64;
    let mut failures = 0i64;

    for (n, &file_id) in file_ids.iter().enumerate() {
        let result = (|| -> Result<(), AppError> {
            let file = db.get_file(file_id)?.ok_or_else(|| AppError::NotFound("file".into()))?;
            let old_path = Path::new(&file.path);
            let dir = old_path.parent().unwrap_or_else(|| Path::new("."));
            let basename = old_path.file_name().and_then(|n| n.to_str()).unwrap_or("");

            let mut stripped = basename.to_string();
            for pattern in &patterns {
                stripped = replace_case_insensitive(&stripped, &format!("[{pattern}]"), "");
            }
            let stripped = collapse_whitespace(&stripped);

            let stem = Path::new(&stripped).file_stem().and_then(|s| s.to_str()).unwrap_or(&stripped).to_string();
            let ext = Path::new(&stripped).extension().and_then(|e| e.to_str()).map(|e| format!(".{e}")).unwrap_or_default();
            let prefix: String = new_names.iter().map(|n| format!("[{}]", n.trim())).collect();
            let new_basename = format!("{prefix} {stem}{ext}").trim_start().to_string();

            let new_path = dir.join(&new_basename);
            rename(old_path, &new_path)?;
            let new_path_str = new_path.to_string_lossy().into_owned();
            db.update_file_path(file_id, &new_path_str)?;
            db.detach_tag(file_id, source_tag_id)?;
            for &tag_id in &new_tag_ids {
                db.attach_tag(file_id, tag_id)?;
            }
            Ok(())
        })();

        if result.is_err() {
            failures += 1;
        }
        engine.update_progress(task_id, n as i64 + 1, total, None)?;
    }

    if failures == 0 {
        db.delete_tag(source_tag_id)?;
    }

    let status = if failures == 0 { TaskStatus::Completed } else { TaskStatus::Failed };
    let message = if failures == 0 { None } else { Some(format!("{failures}/{total} files failed")) };
    engine.finish(task_id, status, message.as_deref())?;
    Ok(())
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;
    let mut rest_lower = lower_haystack.as_str();

    while let Some(pos) = rest_lower.find(&lower_needle) {
        out.push_str(&rest[..pos]);
        out.push_str(replacement);
        rest = &rest[pos + needle.len()..];
        rest_lower = &rest_lower[pos + needle.len()..];
    }
    out.push_str(rest);
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_component_replaces_forbidden_chars_in_stem_and_ext() {
        assert_eq!(sanitize_component("a:b.c?d"), "a_b.c_d");
    }

    #[test]
    fn render_template_strips_unresolved_placeholders() {
        let tags = HashMap::new();
        let out = render_template("{author} - {title} {missing}", 1, "My Title", &tags);
        assert_eq!(out, " - My Title ");
    }

    #[test]
    fn render_template_substitutes_known_tag_types_and_custom() {
        let mut tags = HashMap::new();
        tags.insert("author".to_string(), vec!["Jane Doe".to_string()]);
        tags.insert("format".to_string(), vec!["Digital".to_string()]);
        let out = render_template("{author}/{custom_tag:format}/{title}", 1, "Vol 1", &tags);
        assert_eq!(out, "Jane Doe/Digital/Vol 1");
    }

    #[test]
    fn resolve_within_root_rejects_escape() {
        let root = Path::new("/lib");
        assert!(resolve_within_root(root, "../outside.zip").is_none());
        assert!(resolve_within_root(root, "sub/inside.zip").is_some());
    }

    #[test]
    fn replace_case_insensitive_matches_regardless_of_case() {
        assert_eq!(replace_case_insensitive("[Action] Title", "[action]", ""), " Title");
    }

    #[test]
    fn collapse_whitespace_joins_single_spaces() {
        assert_eq!(collapse_whitespace("  a   b  c "), "a b c");
    }
}
