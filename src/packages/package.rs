// src/packages/package.rs

//! Opened package representation
//!
//! A package is a zip archive with two well-known entries: the manifest
//! and the nested payload archive. Opening a package parses the manifest;
//! the payload is only decompressed when the installer asks for it.

use crate::error::{Error, Result};
use crate::packages::manifest::PackageManifest;
use semver::Version;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

/// Name of the nested payload archive inside a package
pub const PAYLOAD_ENTRY: &str = "data.zip";

/// Name of the manifest entry inside a package
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Package metadata plus the file accounting filled in during installation
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    /// Lowercase hex SHA-256 of the decompressed payload archive
    pub checksum: String,
    /// Raw `manifest.json` bytes, written to disk verbatim
    pub manifest: Vec<u8>,
    pub version: Option<Version>,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    files: Vec<String>,
}

impl PackageInfo {
    fn from_manifest(manifest: PackageManifest, raw: Vec<u8>) -> Self {
        Self {
            name: manifest.name,
            checksum: manifest.checksum,
            manifest: raw,
            version: manifest.version,
            description: manifest.description,
            dependencies: manifest.dependencies,
            files: Vec::new(),
        }
    }

    /// Paths recorded so far, in extraction order
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Number of recorded paths
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Record a payload entry as created by this install
    pub fn record_file(&mut self, path: impl Into<String>) {
        self.files.push(path.into());
    }

    pub fn clear_files(&mut self) {
        self.files.clear();
    }
}

/// An opened package borrowing the caller's buffer
pub struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    info: PackageInfo,
}

impl<'a> Package<'a> {
    /// Open a package from an in-memory buffer
    ///
    /// Fails with `ArchiveError` if the buffer is not a zip archive or the
    /// manifest is missing or invalid. No package is returned on failure.
    pub fn open(buffer: &'a [u8]) -> Result<Self> {
        if buffer.is_empty() {
            return Err(Error::InvalidArgument("Package buffer is empty".to_string()));
        }

        let mut archive = ZipArchive::new(Cursor::new(buffer))
            .map_err(|e| Error::ArchiveError(format!("Failed to open package archive: {}", e)))?;

        let raw = {
            let mut entry = archive.by_name(MANIFEST_ENTRY).map_err(|_| {
                Error::ArchiveError(format!("No '{}' was found in package", MANIFEST_ENTRY))
            })?;

            let mut raw = Vec::new();
            entry.read_to_end(&mut raw).map_err(|e| {
                Error::ArchiveError(format!("Failed to read '{}': {}", MANIFEST_ENTRY, e))
            })?;
            raw
        };

        let manifest = PackageManifest::parse(&raw)?;

        debug!(
            "Opened package {} ({} archive entries, {} manifest bytes)",
            manifest.name,
            archive.len(),
            raw.len()
        );

        Ok(Self {
            archive,
            info: PackageInfo::from_manifest(manifest, raw),
        })
    }

    /// Release the archive and all package memory
    pub fn close(self) {
        debug!("Closing package {}", self.info.name);
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut PackageInfo {
        &mut self.info
    }

    /// Decompress the nested payload archive into a new buffer
    pub fn read_payload(&mut self) -> Result<Vec<u8>> {
        let mut entry = self.archive.by_name(PAYLOAD_ENTRY).map_err(|_| {
            Error::ArchiveError(format!("No '{}' was found in package", PAYLOAD_ENTRY))
        })?;

        let size = usize::try_from(entry.size()).map_err(|_| {
            Error::OutOfMemory(format!("'{}' is too large for this platform", PAYLOAD_ENTRY))
        })?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(size).map_err(|e| {
            Error::OutOfMemory(format!(
                "Failed to allocate {} bytes for '{}': {}",
                size, PAYLOAD_ENTRY, e
            ))
        })?;

        entry.read_to_end(&mut buffer).map_err(|e| {
            Error::ArchiveError(format!("Failed to decompress '{}': {}", PAYLOAD_ENTRY, e))
        })?;

        debug!("Decompressed {} ({} bytes)", PAYLOAD_ENTRY, buffer.len());
        Ok(buffer)
    }
}
