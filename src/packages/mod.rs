// src/packages/mod.rs

//! Package model for Parcel
//!
//! This module provides the opened-package representation, manifest
//! parsing, and a builder for producing package archives.

pub mod builder;
pub mod manifest;
pub mod package;

pub use builder::PackageBuilder;
pub use manifest::PackageManifest;
pub use package::{Package, PackageInfo, MANIFEST_ENTRY, PAYLOAD_ENTRY};
