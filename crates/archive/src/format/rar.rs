//! RAR/CBR adapter, backed by libarchive via `compress-tools`. libarchive
//! exposes RAR as a forward-only stream, so entries carry no size in the
//! listing; the size cache picks up the slack after a first read.

use std::fs::File;
use std::path::Path;

use crate::entry::{is_supported_image, sort_entries, Entry};
use crate::error::{ArchiveError, Result};

use super::ArchiveFormat;

pub struct RarFormat;

impl ArchiveFormat for RarFormat {
    fn list(&self, path: &Path) -> Result<Vec<Entry>> {
        let mut file = File::open(path)?;
        let names = compress_tools::list_archive_files(&mut file)
            .map_err(|e| ArchiveError::ArchiveCorrupt(e.to_string()))?;

        let mut entries: Vec<Entry> = names
            .into_iter()
            .filter(|name| is_supported_image(name, name.ends_with('/')))
            .map(|name| Entry { name, uncompressed_size: None })
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn read_entry(&self, path: &Path, entry_name: &str) -> Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        compress_tools::uncompress_archive_file(&mut file, &mut buf, entry_name)
            .map_err(|e| ArchiveError::ReadFailed(e.to_string()))?;
        Ok(buf)
    }
}
