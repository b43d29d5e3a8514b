// src/archive.rs

//! Payload archive access
//!
//! Wraps the nested `data.zip` payload: entry enumeration and extraction
//! of single entries below an install root.

use crate::error::{Error, Result};
use crate::filesystem::create_dir_all;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// One entry of a payload archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    pub index: usize,
    pub name: String,
}

impl PayloadEntry {
    /// Directory markers are entries whose name ends with `/`
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// An opened payload archive borrowing the decompressed buffer
pub struct PayloadArchive<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> PayloadArchive<'a> {
    pub fn open(buffer: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(buffer))
            .map_err(|e| Error::ArchiveError(format!("Failed to open payload archive: {}", e)))?;

        Ok(Self { archive })
    }

    pub fn entry_count(&self) -> usize {
        self.archive.len()
    }

    /// Entries in archive order
    pub fn entries(&mut self) -> Result<Vec<PayloadEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());

        for index in 0..self.archive.len() {
            let file = self.archive.by_index(index).map_err(|e| {
                Error::ArchiveError(format!("Failed to read payload entry {}: {}", index, e))
            })?;

            entries.push(PayloadEntry {
                index,
                name: file.name().to_string(),
            });
        }

        Ok(entries)
    }

    /// Extract a single entry below `dest`, preserving its relative path
    ///
    /// Regular files that already exist are replaced. Entries whose path
    /// would escape `dest` are rejected.
    pub fn extract_entry(&mut self, entry: &PayloadEntry, dest: &Path) -> Result<()> {
        let mut file = self.archive.by_index(entry.index).map_err(|e| {
            Error::ArchiveError(format!("Failed to read payload entry '{}': {}", entry.name, e))
        })?;

        let relative = file.enclosed_name().ok_or_else(|| {
            Error::ArchiveError(format!("Unsafe path in payload archive: '{}'", entry.name))
        })?;
        let target = dest.join(relative);

        let extract_err = |e: io::Error| {
            Error::IoError(format!(
                "Failed to extract '{}' to {}: {}",
                entry.name,
                target.display(),
                e
            ))
        };

        if entry.is_dir() {
            create_dir_all(&target).map_err(extract_err)?;
            debug!("Created directory {}", target.display());
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            create_dir_all(parent).map_err(extract_err)?;
        }

        // Unlink first so read-only or busy files can still be replaced
        if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
            fs::remove_file(&target).map_err(extract_err)?;
        }

        let mut out = File::create(&target).map_err(extract_err)?;
        let bytes = io::copy(&mut file, &mut out).map_err(extract_err)?;

        if let Some(mode) = file.unix_mode() {
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))
                .map_err(extract_err)?;
        }

        debug!("Extracted {} ({} bytes)", target.display(), bytes);
        Ok(())
    }
}
