//! ZIP/CBZ adapter: the `zip` crate gives true random access via the
//! central directory, so entries are addressed by name without decoding
//! the ones we skip.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::entry::{is_supported_image, sort_entries, Entry};
use crate::error::{ArchiveError, Result};

use super::ArchiveFormat;

pub struct ZipFormat;

impl ArchiveFormat for ZipFormat {
    fn list(&self, path: &Path) -> Result<Vec<Entry>> {
        let file = File::open(path)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| ArchiveError::ArchiveCorrupt(e.to_string()))?;

        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let zf = archive.by_index(i).map_err(|e| ArchiveError::ArchiveCorrupt(e.to_string()))?;
            let name = zf.name().to_string();
            if is_supported_image(&name, zf.is_dir()) {
                entries.push(Entry { name, uncompressed_size: Some(zf.size()) });
            }
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn read_entry(&self, path: &Path, entry_name: &str) -> Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| ArchiveError::ArchiveCorrupt(e.to_string()))?;
        let mut zf = archive
            .by_name(entry_name)
            .map_err(|_| ArchiveError::EntryNotFound(usize::MAX))?;

        let mut buf = Vec::with_capacity(zf.size() as usize);
        zf.read_to_end(&mut buf).map_err(|e| ArchiveError::ReadFailed(e.to_string()))?;
        Ok(buf)
    }
}
