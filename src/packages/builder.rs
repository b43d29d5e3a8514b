// src/packages/builder.rs

//! Package builder
//!
//! Produces a package archive whose manifest checksum matches its payload.

use crate::error::{Error, Result};
use crate::packages::manifest::{validate_name, PackageManifest};
use crate::packages::package::{MANIFEST_ENTRY, PAYLOAD_ENTRY};
use semver::Version;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Cursor, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

#[derive(Debug, Clone)]
enum PayloadEntry {
    Directory(String),
    File { path: String, data: Vec<u8>, mode: u32 },
}

/// Builder for package archives
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    name: String,
    version: Option<Version>,
    description: Option<String>,
    dependencies: Vec<String>,
    entries: Vec<PayloadEntry>,
}

impl PackageBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            dependencies: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Add a directory entry; a trailing `/` is added if missing
    pub fn directory(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = format!("{}/", path.trim_end_matches('/'));
        self.entries.push(PayloadEntry::Directory(path));
        self
    }

    /// Add a regular file entry with the given permission bits
    pub fn file(mut self, path: impl Into<String>, data: Vec<u8>, mode: u32) -> Self {
        self.entries.push(PayloadEntry::File {
            path: path.into(),
            data,
            mode: mode & 0o777,
        });
        self
    }

    /// Add every directory and regular file below `dir`, in file name order
    pub fn from_dir(mut self, dir: &Path) -> Result<Self> {
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry
                .map_err(|e| Error::IoError(format!("Failed to walk {}: {}", dir.display(), e)))?;

            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| Error::IoError(format!("Failed to relativize path: {}", e)))?;

            let components: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            let path = components.join("/");

            let file_type = entry.file_type();
            if file_type.is_dir() {
                self = self.directory(path);
            } else if file_type.is_file() {
                let data = fs::read(entry.path()).map_err(|e| {
                    Error::IoError(format!("Failed to read {}: {}", entry.path().display(), e))
                })?;
                let mode = entry
                    .metadata()
                    .map_err(|e| {
                        Error::IoError(format!("Failed to stat {}: {}", entry.path().display(), e))
                    })?
                    .permissions()
                    .mode();
                self = self.file(path, data, mode);
            } else {
                warn!("Skipping {}: not a regular file or directory", entry.path().display());
            }
        }

        Ok(self)
    }

    /// Build the package archive
    pub fn build(self) -> Result<Vec<u8>> {
        validate_name(&self.name)?;

        let payload = self.build_payload()?;
        let checksum = format!("{:x}", Sha256::digest(&payload));

        let manifest = PackageManifest {
            name: self.name.clone(),
            checksum,
            version: self.version,
            description: self.description,
            dependencies: self.dependencies,
        };
        let manifest_bytes = manifest.to_json()?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let deflated: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Stored);

        zip.start_file(MANIFEST_ENTRY, deflated).map_err(zip_error)?;
        zip.write_all(&manifest_bytes)?;

        zip.start_file(PAYLOAD_ENTRY, stored).map_err(zip_error)?;
        zip.write_all(&payload)?;

        let bytes = zip.finish().map_err(zip_error)?.into_inner();

        info!(
            "Built package {} ({} payload entries, {} bytes)",
            self.name,
            self.entries.len(),
            bytes.len()
        );

        Ok(bytes)
    }

    fn build_payload(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            match entry {
                PayloadEntry::Directory(path) => {
                    let options: FileOptions<'_, ()> =
                        FileOptions::default().unix_permissions(0o755);
                    zip.add_directory(path.as_str(), options).map_err(zip_error)?;
                }
                PayloadEntry::File { path, data, mode } => {
                    let options: FileOptions<'_, ()> = FileOptions::default()
                        .compression_method(CompressionMethod::Deflated)
                        .unix_permissions(*mode);
                    zip.start_file(path.as_str(), options).map_err(zip_error)?;
                    zip.write_all(data)?;
                }
            }
        }

        let payload = zip.finish().map_err(zip_error)?.into_inner();
        debug!("Built {} ({} bytes)", PAYLOAD_ENTRY, payload.len());
        Ok(payload)
    }
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::ArchiveError(format!("Failed to write package archive: {}", e))
}
