//! Format adapters: one implementation per archive container, dispatched
//! by extension. Each adapter reopens the file per call rather than
//! holding a live handle, so a single `ArchiveReader` can be shared
//! across worker threads without synchronizing adapter state.

use std::path::Path;

use crate::entry::Entry;
use crate::error::Result;

pub mod rar;
pub mod sevenzip;
pub mod zip_adapter;

/// Random-access surface a container format must provide. `list` returns
/// natural-sorted, filtered image entries; `read_entry` materializes one
/// entry's bytes in full.
pub trait ArchiveFormat: Send + Sync {
    fn list(&self, path: &Path) -> Result<Vec<Entry>>;
    fn read_entry(&self, path: &Path, entry_name: &str) -> Result<Vec<u8>>;
}

/// Resolve the adapter for a lowercased extension (without the dot), or
/// `None` if the extension is outside the supported set.
pub fn for_extension(ext: &str) -> Option<Box<dyn ArchiveFormat>> {
    match ext {
        "zip" | "cbz" => Some(Box::new(zip_adapter::ZipFormat)),
        "rar" | "cbr" => Some(Box::new(rar::RarFormat)),
        "7z" | "cb7" => Some(Box::new(sevenzip::SevenZipFormat)),
        _ => None,
    }
}
