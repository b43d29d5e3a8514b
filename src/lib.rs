// src/lib.rs

//! Parcel Package Installer
//!
//! Installs zip-packaged software into a per-package directory, with
//! checksum validation and all-or-nothing rollback.
//!
//! # Architecture
//!
//! - Package container: a zip holding `manifest.json` and a nested `data.zip` payload
//! - Install transaction: validate, extract, persist file list, fix permissions
//! - Rollback: recorded paths are removed on any failure, with bounded retries
//! - File-level tracking: every created path is listed for later removal

pub mod archive;
pub mod config;
mod error;
pub mod filesystem;
pub mod install;
pub mod packages;
pub mod privilege;
pub mod source;

pub use config::InstallerConfig;
pub use error::{Error, Result};
pub use install::{InstallOptions, InstallReport, Installer, RemoveReport};
pub use packages::{Package, PackageBuilder, PackageInfo};
pub use source::Source;
