//! Bounded LRU cache of `(canonical_path, mtime, size) -> sorted entries`
//! and a companion per-entry size cache, both keyed by a signature so a
//! file edited in place invalidates without needing exclusive access to
//! the rest of the cache.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::entry::Entry;

/// Cheap fingerprint of a file's on-disk state, used to detect edits
/// without re-reading the archive's central directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub mtime: i64,
    pub size: u64,
}

const DEFAULT_INDEX_CAPACITY: usize = 256;
const DEFAULT_SIZE_CAPACITY: usize = 4096;

struct IndexRecord {
    signature: Signature,
    entries: Vec<Entry>,
}

/// Shared, thread-safe index cache. A read that finds a stale signature
/// evicts just that key and reports a cache miss to the caller, who is
/// expected to re-list and re-insert.
pub struct IndexCache {
    inner: Mutex<LruCache<String, IndexRecord>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INDEX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    /// Return cached entries for `path` if present and the signature
    /// matches; otherwise returns `None` (and evicts a stale record).
    pub fn get(&self, path: &str, signature: Signature) -> Option<Vec<Entry>> {
        let mut guard = self.inner.lock().unwrap();
        match guard.peek(path) {
            Some(record) if record.signature == signature => guard.get(path).map(|r| r.entries.clone()),
            Some(_) => {
                guard.pop(path);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, path: String, signature: Signature, entries: Vec<Entry>) {
        let mut guard = self.inner.lock().unwrap();
        guard.put(path, IndexRecord { signature, entries });
    }
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded LRU keyed by `(path, signature, entry name)`, caching the
/// decoded-once size of formats whose index doesn't carry it (7z).
pub struct SizeCache {
    inner: Mutex<LruCache<(String, Signature, String), u64>>,
}

impl SizeCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SIZE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    pub fn get(&self, path: &str, signature: Signature, entry_name: &str) -> Option<u64> {
        let mut guard = self.inner.lock().unwrap();
        guard.get(&(path.to_string(), signature, entry_name.to_string())).copied()
    }

    pub fn insert(&self, path: String, signature: Signature, entry_name: String, size: u64) {
        let mut guard = self.inner.lock().unwrap();
        guard.put((path, signature, entry_name), size);
    }
}

impl Default for SizeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(mtime: i64, size: u64) -> Signature {
        Signature { mtime, size }
    }

    #[test]
    fn hit_on_matching_signature() {
        let cache = IndexCache::new();
        let entries = vec![Entry { name: "1.jpg".into(), uncompressed_size: Some(10) }];
        cache.insert("a.zip".into(), sig(1, 100), entries.clone());
        assert_eq!(cache.get("a.zip", sig(1, 100)), Some(entries));
    }

    #[test]
    fn miss_on_stale_signature() {
        let cache = IndexCache::new();
        cache.insert("a.zip".into(), sig(1, 100), vec![]);
        assert_eq!(cache.get("a.zip", sig(2, 100)), None);
    }

    #[test]
    fn size_cache_roundtrips() {
        let cache = SizeCache::new();
        cache.insert("a.7z".into(), sig(1, 100), "page1.jpg".into(), 4096);
        assert_eq!(cache.get("a.7z", sig(1, 100), "page1.jpg"), Some(4096));
        assert_eq!(cache.get("a.7z", sig(2, 100), "page1.jpg"), None);
    }
}
