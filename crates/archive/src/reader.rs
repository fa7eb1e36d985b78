//! Top-level archive reader (C1): dispatches to a format adapter by
//! extension and wraps it with the index/size caches. This is the only
//! type callers outside this crate need to hold.

use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::entry::{guess_mime, Entry};
use crate::error::{ArchiveError, Result};
use crate::format;
use crate::index_cache::{IndexCache, SizeCache, Signature};

const DEFAULT_INDEX_CAPACITY: usize = 256;
const DEFAULT_SIZE_CAPACITY: usize = 4096;

pub struct ArchiveReader {
    index_cache: IndexCache,
    size_cache: SizeCache,
}

impl ArchiveReader {
    pub fn new() -> Self {
        Self::with_capacities(DEFAULT_INDEX_CAPACITY, DEFAULT_SIZE_CAPACITY)
    }

    pub fn with_capacities(index_capacity: usize, size_capacity: usize) -> Self {
        Self {
            index_cache: IndexCache::with_capacity(index_capacity),
            size_cache: SizeCache::with_capacity(size_capacity),
        }
    }

    fn signature(path: &Path) -> Result<Signature> {
        let meta = std::fs::metadata(path)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Signature { mtime, size: meta.len() })
    }

    fn extension(path: &Path) -> Result<String> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| ArchiveError::Unsupported(path.display().to_string()))
    }

    fn adapter_for(path: &Path) -> Result<Box<dyn format::ArchiveFormat>> {
        let ext = Self::extension(path)?;
        format::for_extension(&ext).ok_or(ArchiveError::Unsupported(ext))
    }

    /// List an archive's image entries in natural-sort order, filling
    /// the index cache on a miss.
    pub fn list(&self, path: &Path) -> Result<Vec<Entry>> {
        if !path.exists() {
            return Err(ArchiveError::NotFound(path.display().to_string()));
        }
        let signature = Self::signature(path)?;
        let key = path.to_string_lossy().into_owned();

        if let Some(cached) = self.index_cache.get(&key, signature) {
            return Ok(cached);
        }

        let adapter = Self::adapter_for(path)?;
        let entries = adapter.list(path)?;
        self.index_cache.insert(key, signature, entries.clone());
        Ok(entries)
    }

    pub fn entry(&self, path: &Path, index: usize) -> Result<Entry> {
        let entries = self.list(path)?;
        entries.get(index).cloned().ok_or(ArchiveError::EntryNotFound(index))
    }

    /// Read one entry in full. Formats without true streaming decode
    /// (7z) already realize the whole entry in the adapter; this is
    /// simply their common exit point.
    pub fn read_whole(&self, path: &Path, entry: &Entry) -> Result<Vec<u8>> {
        let adapter = Self::adapter_for(path)?;
        adapter.read_entry(path, &entry.name)
    }

    /// Split one entry's bytes into bounded chunks for streaming to an
    /// HTTP response. `chunk_bytes` should come from the
    /// `reader.stream.chunk_kb` setting.
    pub fn stream(&self, path: &Path, entry: &Entry, chunk_bytes: usize) -> Result<Vec<Vec<u8>>> {
        let bytes = self.read_whole(path, entry)?;
        Ok(bytes.chunks(chunk_bytes.max(1)).map(|c| c.to_vec()).collect())
    }

    /// Resolve an entry's byte size, decoding once and caching the
    /// result when the format's index didn't already know it.
    pub fn size(&self, path: &Path, entry: &Entry) -> Result<u64> {
        if let Some(size) = entry.uncompressed_size {
            return Ok(size);
        }

        let signature = Self::signature(path)?;
        let key = path.to_string_lossy().into_owned();
        if let Some(size) = self.size_cache.get(&key, signature, &entry.name) {
            return Ok(size);
        }

        let bytes = self.read_whole(path, entry)?;
        let size = bytes.len() as u64;
        self.size_cache.insert(key, signature, entry.name.clone(), size);
        Ok(size)
    }

    pub fn guess_mime(&self, entry_name: &str) -> &'static str {
        guess_mime(entry_name)
    }
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.txt");
        std::fs::File::create(&path).unwrap().write_all(b"not an archive").unwrap();

        let reader = ArchiveReader::new();
        let err = reader.list(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::Unsupported(_)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let reader = ArchiveReader::new();
        let err = reader.list(Path::new("/nonexistent/book.zip")).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }
}
