// src/filesystem/layout.rs

//! On-disk layout of installed packages
//!
//! Every path is a pure function of the configured bases and the package
//! name:
//!
//! - `<install_base>/<name>/`              extracted payload
//! - `<list_base>/<name>/files.list`       recorded paths, one per line
//! - `<list_base>/<name>/manifest.json`    package manifest, verbatim

use std::path::{Path, PathBuf};

/// File name of the recorded path list inside a list directory
pub const LIST_FILE_NAME: &str = "files.list";

/// File name of the stored manifest inside a list directory
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    install_base: PathBuf,
    list_base: PathBuf,
}

impl InstallLayout {
    pub fn new(install_base: impl Into<PathBuf>, list_base: impl Into<PathBuf>) -> Self {
        Self {
            install_base: install_base.into(),
            list_base: list_base.into(),
        }
    }

    /// Layout with `packages/` and `lists/` below a single data root
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join("packages"), root.join("lists"))
    }

    pub fn install_base(&self) -> &Path {
        &self.install_base
    }

    pub fn list_base(&self) -> &Path {
        &self.list_base
    }

    pub fn install_dir(&self, name: &str) -> PathBuf {
        self.install_base.join(name)
    }

    pub fn list_dir(&self, name: &str) -> PathBuf {
        self.list_base.join(name)
    }

    pub fn list_file(&self, name: &str) -> PathBuf {
        self.list_dir(name).join(LIST_FILE_NAME)
    }

    pub fn manifest_file(&self, name: &str) -> PathBuf {
        self.list_dir(name).join(MANIFEST_FILE_NAME)
    }
}
