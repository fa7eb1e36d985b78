//! 7z/CB7 adapter, backed by the pure-Rust `sevenz-rust` decoder. 7z's
//! solid-block compression rules out true streaming random access, so
//! both listing and reads walk every entry of the archive; callers must
//! not assume constant memory for this format (entries are realized in
//! full before being handed back).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sevenz_rust::{Password, SevenZReader};

use crate::entry::{is_supported_image, sort_entries, Entry};
use crate::error::{ArchiveError, Result};

use super::ArchiveFormat;

pub struct SevenZipFormat;

impl ArchiveFormat for SevenZipFormat {
    fn list(&self, path: &Path) -> Result<Vec<Entry>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut reader = SevenZReader::new(file, len, Password::empty())
            .map_err(|e| ArchiveError::ArchiveCorrupt(e.to_string()))?;

        let mut entries = Vec::new();
        reader
            .for_each_entries(|entry, _| {
                let name = entry.name().to_string();
                if is_supported_image(&name, entry.is_directory()) {
                    entries.push(Entry { name, uncompressed_size: Some(entry.size()) });
                }
                Ok(true)
            })
            .map_err(|e| ArchiveError::ArchiveCorrupt(e.to_string()))?;

        sort_entries(&mut entries);
        Ok(entries)
    }

    fn read_entry(&self, path: &Path, entry_name: &str) -> Result<Vec<u8>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut reader = SevenZReader::new(file, len, Password::empty())
            .map_err(|e| ArchiveError::ArchiveCorrupt(e.to_string()))?;

        let mut out = Vec::new();
        let mut found = false;
        reader
            .for_each_entries(|entry, entry_reader| {
                if entry.name() == entry_name {
                    entry_reader.read_to_end(&mut out)?;
                    found = true;
                }
                Ok(true)
            })
            .map_err(|e| ArchiveError::ReadFailed(e.to_string()))?;

        if !found {
            return Err(ArchiveError::EntryNotFound(usize::MAX));
        }
        Ok(out)
    }
}
