//! Scanner (C7): walk -> reconcile -> analyze (parallel) -> persist ->
//! cover (parallel). Runs as one task-engine job per library root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::WalkBuilder;
use manga_core::model::{File, Integrity, ReadingStatus, TaskStatus};
use manga_core::settings::Settings;
use manga_core::{path_normalize, tagging};
use manga_archive::{cover, ArchiveReader};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::db::Catalog;
use crate::error::AppError;
use crate::tasks::TaskEngine;

const SUPPORTED_ARCHIVE_EXTENSIONS: &[&str] = &["zip", "cbz", "rar", "cbr", "7z", "cb7"];

#[derive(Debug, Clone)]
struct Discovered {
    path: String,
    size: i64,
    mtime: i64,
}

struct AnalysisResult {
    path: String,
    size: i64,
    mtime: i64,
    total_pages: i32,
    content_hash: Option<String>,
    candidate_tag_names: Vec<String>,
}

pub struct Scanner {
    db: Catalog,
    archive: Arc<ArchiveReader>,
    engine: TaskEngine,
    covers_dir: PathBuf,
}

impl Scanner {
    pub fn new(db: Catalog, archive: Arc<ArchiveReader>, engine: TaskEngine, covers_dir: PathBuf) -> Self {
        Self { db, archive, engine, covers_dir }
    }

    fn is_supported_extension(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SUPPORTED_ARCHIVE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn stat(path: &Path) -> Option<(i64, i64)> {
        let meta = std::fs::metadata(path).ok()?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)?;
        Some((meta.len() as i64, mtime))
    }

    /// Parallel directory walk over `root`, collecting every file whose
    /// extension is in the supported archive set. `stat` failures are
    /// logged and skipped rather than aborting the whole walk.
    fn discover(root: &Path) -> Vec<Discovered> {
        let found: Arc<parking_lot::Mutex<Vec<Discovered>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let walker = WalkBuilder::new(root).hidden(false).git_ignore(false).build_parallel();

        walker.run(|| {
            let found = Arc::clone(&found);
            Box::new(move |entry| {
                if let Ok(entry) = entry {
                    let path = entry.path();
                    if entry.file_type().is_some_and(|t| t.is_file()) && Self::is_supported_extension(path) {
                        match Self::stat(path) {
                            Some((size, mtime)) => {
                                found.lock().push(Discovered {
                                    path: path_normalize::normalize_file(&path.to_string_lossy()),
                                    size,
                                    mtime,
                                });
                            }
                            None => warn!(path = %path.display(), "stat failed during discovery, skipping"),
                        }
                    }
                }
                ignore::WalkState::Continue
            })
        });

        Arc::try_unwrap(found).map(|m| m.into_inner()).unwrap_or_default()
    }

    /// Analyze one path: list entries for page count, hash the whole
    /// file when `hash.mode == full`, and extract bracketed tag tokens
    /// from the basename. Pure: callers persist the result.
    fn analyze(&self, disc: &Discovered, hash_enabled: bool) -> AnalysisResult {
        let path = Path::new(&disc.path);
        let total_pages = self.archive.list(path).map(|e| e.len() as i32).unwrap_or(0);
        let content_hash = if hash_enabled { manga_archive::hash::sha256_file(path).ok() } else { None };

        let basename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let (tokens, _title) = tagging::parse_bracket_tokens(basename);

        AnalysisResult {
            path: disc.path.clone(),
            size: disc.size,
            mtime: disc.mtime,
            total_pages,
            content_hash,
            candidate_tag_names: tokens.into_iter().map(|t| t.text).collect(),
        }
    }

    /// Persist one analysis result: update an existing row, adopt a
    /// uniquely-matching missing row (move/rename recovery), or create
    /// a new row. Returns the file id.
    fn persist(&self, root_id: i64, result: &AnalysisResult) -> Result<i64, AppError> {
        let file_id = if let Some(existing) = self.db.get_file_by_path(&result.path)? {
            self.db.update_file_metadata(
                existing.id,
                result.size,
                result.mtime,
                result.total_pages,
                result.content_hash.as_deref(),
            )?;
            existing.id
        } else if let Some(hash) = &result.content_hash {
            let candidates = self.db.find_missing_by_hash(root_id, hash)?;
            if candidates.len() == 1 {
                let candidate = &candidates[0];
                self.db.adopt_file(candidate.id, &result.path, result.size, result.mtime, result.total_pages)?;
                candidate.id
            } else {
                self.insert_new(root_id, result)?
            }
        } else {
            self.insert_new(root_id, result)?
        };

        self.resync_tags_for_candidates(file_id, &result.candidate_tag_names)?;
        Ok(file_id)
    }

    fn insert_new(&self, root_id: i64, result: &AnalysisResult) -> Result<i64, AppError> {
        let now = crate::db::now_unix();
        self.db.insert_file(&File {
            id: 0,
            path: result.path.clone(),
            library_root_id: root_id,
            size_bytes: result.size,
            mtime: result.mtime,
            total_pages: result.total_pages,
            content_hash: result.content_hash.clone(),
            added_at: now,
            last_read_page: 0,
            last_read_at: None,
            reading_status: ReadingStatus::Unread,
            is_missing: false,
            integrity: Integrity::Unknown,
            cover_updated_at: None,
        })
    }

    /// Resolve candidate tag names against the name/alias tables
    /// (case-insensitive); attach matches only, never creating tags.
    fn resync_tags_for_candidates(&self, file_id: i64, candidate_names: &[String]) -> Result<(), AppError> {
        for name in candidate_names {
            if let Some(tag) = self.db.resolve_tag_by_name_or_alias(name)? {
                self.db.attach_tag(file_id, tag.id)?;
            }
        }
        Ok(())
    }

    /// Run a full scan of one library root under `task_id`, which the
    /// caller has already submitted via the task engine.
    pub fn run(&self, task_id: i64, root_id: i64, root_path: &str, settings: &Settings) -> Result<(), AppError> {
        let worker_handle = self.engine.mark_running(task_id)?;
        info!(task_id, root = root_path, worker = worker_handle.as_str(), "scan started");

        match self.run_inner(task_id, root_id, root_path, settings) {
            Ok(()) => {
                self.engine.finish(task_id, TaskStatus::Completed, None)?;
                Ok(())
            }
            Err(AppError::Cancelled) => {
                self.engine.finish(task_id, TaskStatus::Cancelled, None)?;
                Ok(())
            }
            Err(e) => {
                self.engine.finish(task_id, TaskStatus::Failed, Some(&e.to_string()))?;
                Err(e)
            }
        }
    }

    fn run_inner(&self, task_id: i64, root_id: i64, root_path: &str, settings: &Settings) -> Result<(), AppError> {
        let root = Path::new(root_path);
        if !root.is_dir() {
            return Err(AppError::BadRequest(format!("library root not accessible: {root_path}")));
        }

        let max_workers = settings.get_int("scan.max_workers").unwrap_or(12).max(1) as usize;
        let hash_enabled = settings.get("scan.hash.mode").as_deref() != Some("off");
        let cover_enabled = settings.get("scan.cover.mode").as_deref() != Some("off");
        let regenerate_missing = settings.get_bool("scan.cover.regenerate_missing").unwrap_or(true);
        let cancel_interval_ms = settings.get_int("scan.cancel_check.interval_ms").unwrap_or(200) as u64;
        let shard_count = settings.get_int("cover.cache.shard_count").unwrap_or(256) as u32;
        let cover_options = cover::CoverOptions {
            max_width: settings.get_int("scan.cover.max_width").unwrap_or(500) as u32,
            target_kb: settings.get_int("scan.cover.target_kb").unwrap_or(300) as u32,
            quality_start: settings.get_int("scan.cover.quality_start").unwrap_or(80) as u8,
            quality_min: settings.get_int("scan.cover.quality_min").unwrap_or(10) as u8,
            quality_step: settings.get_int("scan.cover.quality_step").unwrap_or(10) as u8,
        };

        let cancel_flag = self.spawn_cancel_watcher(task_id, cancel_interval_ms);

        // --- Discovery ---
        let discovered = Self::discover(root);
        let discovered_by_path: HashMap<&str, &Discovered> =
            discovered.iter().map(|d| (d.path.as_str(), d)).collect();

        // --- Reconciliation ---
        let existing = self.db.list_files_for_root(root_id)?;
        let mut missing_paths = Vec::new();
        let mut reappeared_paths = Vec::new();
        let mut to_analyze: Vec<&Discovered> = Vec::new();
        let mut unchanged_ids = Vec::new();

        for row in &existing {
            match discovered_by_path.get(row.path.as_str()) {
                None => {
                    if !row.is_missing {
                        missing_paths.push(row.path.clone());
                    }
                }
                Some(disc) => {
                    if row.is_missing {
                        reappeared_paths.push(row.path.clone());
                    }
                    if disc.size == row.size_bytes && disc.mtime == row.mtime {
                        unchanged_ids.push(row.id);
                    }
                }
            }
        }
        if !missing_paths.is_empty() {
            self.db.set_missing_for_paths(&missing_paths, true)?;
        }
        if !reappeared_paths.is_empty() {
            self.db.set_missing_for_paths(&reappeared_paths, false)?;
        }

        let existing_unchanged: std::collections::HashSet<&str> = existing
            .iter()
            .filter(|r| unchanged_ids.contains(&r.id))
            .map(|r| r.path.as_str())
            .collect();
        for disc in &discovered {
            if !existing_unchanged.contains(disc.path.as_str()) {
                to_analyze.push(disc);
            }
        }

        let total_work = to_analyze.len() as i64;
        let processed = std::sync::atomic::AtomicI64::new(0);

        // --- Analysis (parallel) ---
        let pool = rayon::ThreadPoolBuilder::new().num_threads(max_workers).build().map_err(|e| {
            AppError::Internal(format!("failed to build scan worker pool: {e}"))
        })?;

        let results: Vec<AnalysisResult> = pool.install(|| {
            to_analyze
                .par_iter()
                .filter(|_| !cancel_flag.is_cancelled())
                .map(|disc| {
                    let result = self.analyze(disc, hash_enabled);
                    let n = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    let _ = self.engine.update_progress(task_id, n, total_work.max(1), Some(&disc.path));
                    result
                })
                .collect()
        });

        // --- Persistence (commit every 10 results) ---
        let mut newly_analyzed_ids = Vec::new();
        for chunk in results.chunks(10) {
            for result in chunk {
                let id = self.persist(root_id, result)?;
                newly_analyzed_ids.push(id);
            }
        }

        // --- Cover phase ---
        if cover_enabled && !cancel_flag.is_cancelled() {
            let mut cover_jobs: Vec<(i64, String, bool)> =
                newly_analyzed_ids.iter().filter_map(|&id| self.db.get_file(id).ok().flatten()).map(|f| (f.id, f.path, true)).collect();

            if regenerate_missing {
                for row in &existing {
                    if unchanged_ids.contains(&row.id) {
                        let cache_path = cover::cache_path(&self.covers_dir, row.id, shard_count);
                        if !cache_path.exists() {
                            cover_jobs.push((row.id, row.path.clone(), false));
                        }
                    }
                }
            }

            let cover_total = cover_jobs.len() as i64;
            let cover_processed = std::sync::atomic::AtomicI64::new(0);
            let updated_ids: Vec<i64> = pool.install(|| {
                cover_jobs
                    .par_iter()
                    .filter(|_| !cancel_flag.is_cancelled())
                    .filter_map(|(file_id, path, force)| {
                        let n = cover_processed.fetch_add(1, Ordering::Relaxed) + 1;
                        let _ = self.engine.update_progress(task_id, total_work + n, total_work + cover_total, Some(path));
                        match cover::generate(&self.archive, Path::new(path), &self.covers_dir, *file_id, shard_count, &cover_options, *force) {
                            Ok(true) => Some(*file_id),
                            _ => None,
                        }
                    })
                    .collect()
            });
            if !updated_ids.is_empty() {
                self.db.set_cover_updated_batch(&updated_ids)?;
            }
        }

        if cancel_flag.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        Ok(())
    }

    /// Run one `scan_all` task across every given root under a single
    /// task id, aggregating progress across roots rather than finishing
    /// and re-submitting per root. Cancellation observed on any root
    /// stops the remaining roots and finishes the task `cancelled`.
    pub fn run_all(&self, task_id: i64, roots: &[(i64, String)], settings: &Settings) -> Result<(), AppError> {
        let worker_handle = self.engine.mark_running(task_id)?;
        info!(task_id, worker = worker_handle.as_str(), roots = roots.len(), "scan-all started");

        for (n, (root_id, root_path)) in roots.iter().enumerate() {
            if self.engine.is_cancelled(task_id)? {
                self.engine.finish(task_id, TaskStatus::Cancelled, None)?;
                return Ok(());
            }
            self.engine.update_progress(task_id, n as i64, roots.len() as i64, Some(root_path))?;
            if let Err(e) = self.run_inner(task_id, *root_id, root_path, settings) {
                if matches!(e, AppError::Cancelled) {
                    self.engine.finish(task_id, TaskStatus::Cancelled, None)?;
                    return Ok(());
                }
                self.engine.finish(task_id, TaskStatus::Failed, Some(&e.to_string()))?;
                return Err(e);
            }
        }
        self.engine.update_progress(task_id, roots.len() as i64, roots.len().max(1) as i64, None)?;
        self.engine.finish(task_id, TaskStatus::Completed, None)?;
        Ok(())
    }

    /// Background thread that re-reads the task's cancel flag at the
    /// configured throttle interval, exposing it as a cheap atomic the
    /// rayon workers can check per item without hitting the store. The
    /// returned guard's `Drop` stops the thread once the scan this
    /// watcher belongs to has finished, whether or not it was cancelled
    /// — otherwise the thread would poll a long-terminal task forever.
    fn spawn_cancel_watcher(&self, task_id: i64, interval_ms: u64) -> CancelWatcher {
        let cancelled = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let cancelled_bg = Arc::clone(&cancelled);
        let stop_bg = Arc::clone(&stop);
        let engine = self.engine.clone();
        std::thread::spawn(move || loop {
            if stop_bg.load(Ordering::Relaxed) {
                break;
            }
            match engine.is_cancelled(task_id) {
                Ok(true) => {
                    cancelled_bg.store(true, Ordering::Relaxed);
                    break;
                }
                Ok(false) => {}
                Err(_) => break,
            }
            std::thread::sleep(std::time::Duration::from_millis(interval_ms));
        });
        CancelWatcher { cancelled, stop }
    }
}

/// Owns the cancel-polling background thread's lifetime. Stopping is
/// best-effort: the thread notices within one `interval_ms` tick of
/// `Drop`, never blocking the caller on it.
struct CancelWatcher {
    cancelled: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl CancelWatcher {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Drop for CancelWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(Scanner::is_supported_extension(Path::new("a.ZIP")));
        assert!(Scanner::is_supported_extension(Path::new("a.cbz")));
        assert!(!Scanner::is_supported_extension(Path::new("a.txt")));
    }
}
