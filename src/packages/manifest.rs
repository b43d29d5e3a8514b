// src/packages/manifest.rs

//! Package manifest (`manifest.json`) parsing
//!
//! The manifest is stored verbatim on disk after installation. Only the
//! fields below are interpreted by the installer; anything else is left
//! for external tooling.

use crate::error::{Error, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Length of a hex-encoded SHA-256 digest
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Fields of `manifest.json` the installer relies on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl PackageManifest {
    /// Parse and validate manifest bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut manifest: PackageManifest = serde_json::from_slice(bytes)
            .map_err(|e| Error::ArchiveError(format!("Invalid manifest.json: {}", e)))?;

        validate_name(&manifest.name)?;
        manifest.checksum = normalize_checksum(&manifest.checksum)?;

        Ok(manifest)
    }

    /// Serialize to pretty JSON, as written into built packages
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| Error::ArchiveError(format!("Failed to serialize manifest: {}", e)))
    }
}

/// Check that a package name is safe to use as a single path component
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::ArchiveError("Package name is empty".to_string()));
    }

    if name == "." || name == ".." {
        return Err(Error::ArchiveError(format!("Invalid package name: '{}'", name)));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(Error::ArchiveError(format!(
            "Package name contains a path separator: '{}'",
            name
        )));
    }

    if name.trim() != name {
        return Err(Error::ArchiveError(format!(
            "Package name has surrounding whitespace: '{}'",
            name
        )));
    }

    Ok(())
}

/// Lowercase a hex SHA-256 digest, rejecting anything that is not one
fn normalize_checksum(checksum: &str) -> Result<String> {
    let checksum = checksum.trim();

    if checksum.len() != CHECKSUM_HEX_LEN || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::ArchiveError(format!(
            "Invalid checksum '{}': expected {} hex digits",
            checksum, CHECKSUM_HEX_LEN
        )));
    }

    Ok(checksum.to_ascii_lowercase())
}
