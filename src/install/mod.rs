// src/install/mod.rs

//! Package installation and removal
//!
//! This module provides:
//! - Source dispatch (in-memory buffer, file, stream, URL)
//! - Checksum validation of the nested payload before anything is written
//! - The install transaction with rollback (see `transaction`)
//! - Removal of installed packages from their recorded file lists

pub mod retry;
pub mod transaction;

pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use transaction::{InstallPhase, Transaction};

use crate::archive::PayloadArchive;
use crate::config::InstallerConfig;
use crate::error::{Error, Result};
use crate::filesystem::{self, remove_recorded};
use crate::packages::manifest::validate_name;
use crate::packages::Package;
use crate::source::{self, GitSource, Source};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for a single install
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Install over an existing installation of the same package
    pub update_when_exists: bool,
    /// Skip dependency checks
    pub ignore_dependencies: bool,
    /// Where the package comes from; a `Local` buffer carries its own length
    pub source: Option<Source>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            update_when_exists: true,
            ignore_dependencies: false,
            source: None,
        }
    }
}

impl InstallOptions {
    pub fn with_source(source: Source) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }
}

/// Outcome of a successful install
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub name: String,
    pub install_dir: PathBuf,
    pub list_file: PathBuf,
    /// Paths recorded for later removal, in extraction order
    pub files: Vec<String>,
}

/// Outcome of a successful removal
#[derive(Debug, Clone)]
pub struct RemoveReport {
    pub name: String,
    pub files: usize,
}

/// Package installer bound to a configuration
pub struct Installer<S: Sleeper = ThreadSleeper> {
    config: InstallerConfig,
    sleeper: S,
}

impl Installer<ThreadSleeper> {
    pub fn new(config: InstallerConfig) -> Self {
        Self {
            config,
            sleeper: ThreadSleeper,
        }
    }
}

impl<S: Sleeper> Installer<S> {
    /// Replace the sleeper used between rollback attempts
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> Installer<T> {
        Installer {
            config: self.config,
            sleeper,
        }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Install from whatever source `options` names
    pub fn install(&self, options: &InstallOptions) -> Result<InstallReport> {
        match &options.source {
            None => Err(Error::InvalidArgument("No package source given".to_string())),
            Some(Source::Local(bytes)) => self.install_from_buffer(bytes, options),
            Some(Source::File(path)) => self.install_file_with(path, options),
            Some(Source::Git(git)) => self.install_git(git, options),
        }
    }

    /// Install from a source string (`git://`, `github:`, `file://` or a path)
    pub fn install_from_url(&self, url: &str, options: &InstallOptions) -> Result<InstallReport> {
        match Source::parse(url)? {
            Source::Local(bytes) => self.install_from_buffer(&bytes, options),
            Source::File(path) => self.install_file_with(&path, options),
            Source::Git(git) => self.install_git(&git, options),
        }
    }

    /// Install a package file with default options
    pub fn install_from_file(&self, path: &Path) -> Result<InstallReport> {
        self.install_file_with(path, &InstallOptions::default())
    }

    /// Read a stream to completion and install it with default options
    pub fn install_from_reader<R: Read>(&self, reader: R) -> Result<InstallReport> {
        self.install_reader_with(reader, &InstallOptions::default())
    }

    /// Install a package held in memory
    pub fn install_from_buffer(&self, bytes: &[u8], options: &InstallOptions) -> Result<InstallReport> {
        if bytes.is_empty() {
            return Err(Error::InvalidArgument(
                "Invalid length of package source".to_string(),
            ));
        }

        let mut package = Package::open(bytes)?;
        info!("Installing {}", package.name());

        let result = self.install_package(&mut package, options);
        package.close();
        result
    }

    fn install_file_with(&self, path: &Path, options: &InstallOptions) -> Result<InstallReport> {
        let file = File::open(path).map_err(|e| {
            Error::IoError(format!("Failed to open package {}: {}", path.display(), e))
        })?;
        self.install_reader_with(file, options)
    }

    fn install_reader_with<R: Read>(&self, mut reader: R, options: &InstallOptions) -> Result<InstallReport> {
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .map_err(|e| Error::IoError(format!("Failed to read package: {}", e)))?;

        self.install_from_buffer(&buffer, options)
    }

    fn install_git(&self, git: &GitSource, options: &InstallOptions) -> Result<InstallReport> {
        info!("Downloading package from git repository {}", git);

        let temp = source::fetch_git(git, &self.config.git_base_url, &self.config.git_default_ref)?;
        let result = self.install_file_with(temp.path(), options);

        if let Err(e) = temp.close() {
            warn!("Failed to remove downloaded package: {}", e);
        }

        result
    }

    fn install_package(&self, package: &mut Package<'_>, options: &InstallOptions) -> Result<InstallReport> {
        let name = package.name().to_string();
        let layout = &self.config.layout;
        debug!("{}: {}", name, InstallPhase::Validating);

        if !options.update_when_exists && layout.list_file(&name).exists() {
            return Err(Error::AlreadyInstalled(name));
        }

        let dependencies = &package.info().dependencies;
        if !dependencies.is_empty() {
            if options.ignore_dependencies {
                debug!("Ignoring dependencies of {}: {}", name, dependencies.join(", "));
            } else {
                warn!(
                    "{} depends on {}; dependency checks are not performed",
                    name,
                    dependencies.join(", ")
                );
            }
        }

        let payload = package.read_payload()?;
        let actual = format!("{:x}", Sha256::digest(&payload));
        if actual != package.info().checksum {
            return Err(Error::ChecksumMismatch {
                expected: package.info().checksum.clone(),
                actual,
            });
        }
        debug!("Checksum verified: {}", actual);

        let mut archive = PayloadArchive::open(&payload)?;
        if archive.entry_count() == 0 {
            return Err(Error::EmptyPayload);
        }

        let mut transaction = Transaction::begin(
            layout,
            &name,
            self.config.ownership,
            &self.config.rollback,
            &self.sleeper,
        )?;
        transaction.run(package.info_mut(), &mut archive)?;

        info!("Package '{}' was successfully installed", name);

        Ok(InstallReport {
            install_dir: transaction.install_dir().to_path_buf(),
            list_file: transaction.list_file().to_path_buf(),
            files: package.info().files().to_vec(),
            name,
        })
    }

    /// Remove an installed package using its recorded file list
    ///
    /// Recorded paths are removed newest first, then empty directories left
    /// in the install directory are pruned. Content that was not recorded
    /// is kept.
    pub fn remove(&self, name: &str) -> Result<RemoveReport> {
        validate_name(name).map_err(|e| Error::InvalidArgument(e.to_string()))?;

        let layout = &self.config.layout;
        let list_file = layout.list_file(name);

        let contents = match fs::read_to_string(&list_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("Package '{}' is not installed", name)));
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read {}: {}",
                    list_file.display(),
                    e
                )));
            }
        };

        let files: Vec<String> = contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        info!("Removing {} ({} recorded paths)", name, files.len());

        let install_dir = layout.install_dir(name);
        remove_recorded(&install_dir, &files).map_err(|e| {
            Error::IoError(format!("Failed to remove files of {}: {}", name, e))
        })?;
        filesystem::prune_empty_dirs(&install_dir).map_err(|e| {
            Error::IoError(format!("Failed to clean up {}: {}", install_dir.display(), e))
        })?;

        let list_dir = layout.list_dir(name);
        fs::remove_dir_all(&list_dir).map_err(|e| {
            Error::IoError(format!("Failed to remove {}: {}", list_dir.display(), e))
        })?;

        info!("Package '{}' was removed", name);
        Ok(RemoveReport {
            name: name.to_string(),
            files: files.len(),
        })
    }

    /// Names of installed packages, sorted
    pub fn installed_packages(&self) -> Result<Vec<String>> {
        let list_base = self.config.layout.list_base();

        let entries = match fs::read_dir(list_base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read {}: {}",
                    list_base.display(),
                    e
                )));
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if self.config.layout.list_file(&name).is_file() {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}
