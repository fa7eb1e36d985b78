//! Cover cache (C3): derives the sharded on-disk path for a file id and
//! generates its WebP thumbnail from the archive's cover entry.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::DynamicImage;

use crate::entry::Entry;
use crate::error::{ArchiveError, Result};
use crate::reader::ArchiveReader;

/// Quality and sizing knobs for cover generation, sourced from the
/// `scan.cover.*` settings.
#[derive(Debug, Clone, Copy)]
pub struct CoverOptions {
    pub max_width: u32,
    pub target_kb: u32,
    pub quality_start: u8,
    pub quality_min: u8,
    pub quality_step: u8,
}

const COVER_BASENAME_CANDIDATES: &[&str] = &["cover", "000", "0000", "封面"];

/// Derive the cache path for a file id: `base / hex(file_id mod
/// shard_count) / file_id.webp`, with the shard rendered as at least
/// two hex digits.
pub fn cache_path(base: &Path, file_id: i64, shard_count: u32) -> PathBuf {
    let shard_count = shard_count.max(1);
    let shard = file_id.rem_euclid(shard_count as i64) as u32;
    base.join(format!("{shard:02x}")).join(format!("{file_id}.webp"))
}

/// Pick the cover entry: the first whose extensionless, case-folded
/// basename is a recognized cover marker, else the first entry.
fn pick_cover_entry(entries: &[Entry]) -> Option<&Entry> {
    entries
        .iter()
        .find(|e| {
            let stem = Path::new(&e.name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_lowercase();
            COVER_BASENAME_CANDIDATES.contains(&stem.as_str())
        })
        .or_else(|| entries.first())
}

/// Generate (or refresh) the cover for `file_id`. Returns `Ok(true)` when
/// a cover was written and `Ok(false)` when generation was skipped
/// because `force` was false and a cover already existed. Any failure
/// removes the temp file it may have created.
pub fn generate(
    reader: &ArchiveReader,
    archive_path: &Path,
    cache_base: &Path,
    file_id: i64,
    shard_count: u32,
    options: &CoverOptions,
    force: bool,
) -> Result<bool> {
    let final_path = cache_path(cache_base, file_id, shard_count);
    if !force && final_path.exists() {
        return Ok(false);
    }

    let entries = reader.list(archive_path)?;
    let cover_entry = pick_cover_entry(&entries).ok_or(ArchiveError::EntryNotFound(0))?.clone();
    let bytes = reader.read_whole(archive_path, &cover_entry)?;

    let img = image::load_from_memory(&bytes).map_err(|e| ArchiveError::ReadFailed(e.to_string()))?;
    let resized = if img.width() > options.max_width {
        img.resize(options.max_width, u32::MAX, FilterType::Lanczos3)
    } else {
        img
    };

    let shard_dir = final_path.parent().expect("cache path always has a parent");
    fs::create_dir_all(shard_dir)?;
    let tmp_path = shard_dir.join(format!(".{file_id}.webp.{}.tmp", std::process::id()));

    match encode_within_budget(&resized, &tmp_path, options) {
        Ok(()) => {
            fs::rename(&tmp_path, &final_path)?;
            Ok(true)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

/// Encode at `quality_start`, then iteratively step quality down toward
/// `quality_min` until the file lands at or under `target_kb` or the
/// floor is hit — whichever comes first.
fn encode_within_budget(img: &DynamicImage, tmp_path: &Path, options: &CoverOptions) -> Result<()> {
    let target_bytes = options.target_kb as u64 * 1024;
    let rgba = img.to_rgba8();
    let mut quality = options.quality_start;

    loop {
        let encoded = encode_webp(&rgba, quality)?;
        let size = encoded.len() as u64;

        if size <= target_bytes || quality <= options.quality_min {
            let mut file = File::create(tmp_path)?;
            file.write_all(&encoded)?;
            file.flush()?;
            return Ok(());
        }
        quality = quality.saturating_sub(options.quality_step).max(options.quality_min);
    }
}

fn encode_webp(rgba: &image::RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let encoder = webp::Encoder::from_rgba(rgba, rgba.width(), rgba.height());
    Ok(encoder.encode(quality as f32).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_uses_two_digit_hex_shards() {
        let base = Path::new("/covers");
        assert_eq!(cache_path(base, 1, 256), PathBuf::from("/covers/01/1.webp"));
        assert_eq!(cache_path(base, 256, 256), PathBuf::from("/covers/00/256.webp"));
    }

    #[test]
    fn cache_path_is_deterministic_mod_shard_count() {
        let base = Path::new("/covers");
        let a = cache_path(base, 10, 8);
        let b = cache_path(base, 10, 8);
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/covers/02/10.webp"));
    }

    #[test]
    fn cover_candidate_names_are_preferred_over_first_entry() {
        let entries = vec![
            Entry { name: "page1.jpg".into(), uncompressed_size: None },
            Entry { name: "Cover.jpg".into(), uncompressed_size: None },
            Entry { name: "page2.jpg".into(), uncompressed_size: None },
        ];
        let picked = pick_cover_entry(&entries).unwrap();
        assert_eq!(picked.name, "Cover.jpg");
    }

    #[test]
    fn falls_back_to_first_entry_when_no_candidate_matches() {
        let entries = vec![
            Entry { name: "page1.jpg".into(), uncompressed_size: None },
            Entry { name: "page2.jpg".into(), uncompressed_size: None },
        ];
        let picked = pick_cover_entry(&entries).unwrap();
        assert_eq!(picked.name, "page1.jpg");
    }
}
