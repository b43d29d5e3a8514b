// src/install/transaction.rs

//! Install transaction state machine
//!
//! ```text
//! Validating -> Extracting -> Persisting -> Finalizing -> Done
//!                   |             |              |
//!                   +-------------+--------------+--> RollingBack -> Failed
//! ```
//!
//! Validation happens before a transaction is started, so a transaction
//! only ever begins once the payload checksum has been verified. From
//! `Extracting` onward every failure triggers a rollback before the error
//! is returned.

use crate::archive::PayloadArchive;
use crate::error::{Error, Result};
use crate::filesystem::{
    self, chmod_recursive, chown_recursive, create_dir_all, recorded_path, remove_file_if_exists,
    remove_recorded, InstallLayout, Ownership, EXEC_MODE,
};
use crate::install::retry::{RetryPolicy, Sleeper};
use crate::packages::PackageInfo;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Validating,
    Extracting,
    Persisting,
    Finalizing,
    RollingBack,
    Done,
    Failed,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallPhase::Validating => "validating",
            InstallPhase::Extracting => "extracting",
            InstallPhase::Persisting => "persisting",
            InstallPhase::Finalizing => "finalizing",
            InstallPhase::RollingBack => "rolling back",
            InstallPhase::Done => "done",
            InstallPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Contents of a file as it was before the transaction started
#[derive(Debug)]
enum Snapshot {
    Absent,
    Present(Vec<u8>),
}

impl Snapshot {
    fn take(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(Snapshot::Present(bytes)),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                Ok(Snapshot::Absent)
            }
            Err(e) => Err(Error::IoError(format!("Failed to read {}: {}", path.display(), e))),
        }
    }

    fn restore(&self, path: &Path) -> io::Result<()> {
        match self {
            Snapshot::Absent => remove_file_if_exists(path),
            Snapshot::Present(bytes) => fs::write(path, bytes),
        }
    }
}

/// A regular file that an extracted entry is about to overwrite
#[derive(Debug)]
struct ReplacedFile {
    path: PathBuf,
    contents: Vec<u8>,
    mode: u32,
}

impl ReplacedFile {
    /// Save `path` if it is a regular file; anything else has nothing to restore
    fn take(path: &Path) -> Result<Option<Self>> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Ok(None),
        };

        let contents = fs::read(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

        Ok(Some(Self {
            path: path.to_path_buf(),
            contents,
            mode: metadata.permissions().mode() & 0o7777,
        }))
    }

    fn restore(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            create_dir_all(parent)?;
        }
        fs::write(&self.path, &self.contents)?;
        fs::set_permissions(&self.path, fs::Permissions::from_mode(self.mode))
    }
}

/// One install of one package into its layout directories
pub struct Transaction<'a, S: Sleeper> {
    name: String,
    install_dir: PathBuf,
    list_dir: PathBuf,
    list_file: PathBuf,
    manifest_file: PathBuf,
    install_dir_existed: bool,
    list_dir_existed: bool,
    previous_list: Snapshot,
    previous_manifest: Snapshot,
    replaced: Vec<ReplacedFile>,
    ownership: Option<Ownership>,
    rollback_policy: &'a RetryPolicy,
    sleeper: &'a S,
    phase: InstallPhase,
}

impl<'a, S: Sleeper> Transaction<'a, S> {
    /// Capture the pre-install state of the package's directories
    ///
    /// Nothing on disk is modified.
    pub fn begin(
        layout: &InstallLayout,
        name: &str,
        ownership: Option<Ownership>,
        rollback_policy: &'a RetryPolicy,
        sleeper: &'a S,
    ) -> Result<Self> {
        let install_dir = layout.install_dir(name);
        let list_dir = layout.list_dir(name);
        let list_file = layout.list_file(name);
        let manifest_file = layout.manifest_file(name);

        let transaction = Self {
            name: name.to_string(),
            install_dir_existed: fs::symlink_metadata(&install_dir).is_ok(),
            list_dir_existed: fs::symlink_metadata(&list_dir).is_ok(),
            previous_list: Snapshot::take(&list_file)?,
            previous_manifest: Snapshot::take(&manifest_file)?,
            replaced: Vec::new(),
            install_dir,
            list_dir,
            list_file,
            manifest_file,
            ownership,
            rollback_policy,
            sleeper,
            phase: InstallPhase::Validating,
        };

        debug!(
            "Starting transaction for {} (install dir existed: {}, list dir existed: {})",
            transaction.name, transaction.install_dir_existed, transaction.list_dir_existed
        );

        Ok(transaction)
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn list_file(&self) -> &Path {
        &self.list_file
    }

    /// Run extraction, persistence and finalization; roll back on failure
    pub fn run(&mut self, info: &mut PackageInfo, payload: &mut PayloadArchive<'_>) -> Result<()> {
        match self.apply(info, payload) {
            Ok(()) => {
                self.enter(InstallPhase::Done);
                Ok(())
            }
            Err(cause) => Err(self.rollback(info, cause)),
        }
    }

    /// Undo everything this transaction created after `cause` stopped it
    ///
    /// Returns `cause` when the rollback completes, or `RollbackIncomplete`
    /// wrapping it once the retry budget is spent.
    pub fn rollback(&mut self, info: &PackageInfo, cause: Error) -> Error {
        error!("Installing {} failed: {}", self.name, cause);
        self.enter(InstallPhase::RollingBack);

        let outcome = self
            .rollback_policy
            .run(self.sleeper, |_| self.remove_created(info.files()));
        self.enter(InstallPhase::Failed);

        match outcome {
            Ok(()) => {
                info!("Rolled back {}", self.name);
                cause
            }
            Err(exhausted) => {
                error!(
                    "Rollback of {} failed after {} attempts: {}; partial install left at {}",
                    self.name,
                    exhausted.attempts,
                    exhausted.last_error,
                    self.install_dir.display()
                );
                Error::RollbackIncomplete {
                    package: self.name.clone(),
                    attempts: exhausted.attempts,
                    cause: Box::new(cause),
                }
            }
        }
    }

    fn apply(&mut self, info: &mut PackageInfo, payload: &mut PayloadArchive<'_>) -> Result<()> {
        self.extract(info, payload)?;
        self.persist(info)?;
        self.finalize()
    }

    fn enter(&mut self, phase: InstallPhase) {
        debug!("{}: {} -> {}", self.name, self.phase, phase);
        self.phase = phase;
    }

    /// Extract every payload entry, recording the ones this install creates
    pub fn extract(&mut self, info: &mut PackageInfo, payload: &mut PayloadArchive<'_>) -> Result<()> {
        self.enter(InstallPhase::Extracting);
        info.clear_files();
        self.replaced.clear();

        for entry in payload.entries()? {
            // Pre-existing directories are not ours to remove later
            let record = !(entry.is_dir() && self.install_dir.join(&entry.name).exists());

            // Files from a previous install are put back on rollback
            if !entry.is_dir() && !info.files().contains(&entry.name) {
                if let Some(target) = recorded_path(&self.install_dir, &entry.name) {
                    if let Some(replaced) = ReplacedFile::take(&target)? {
                        debug!("Saved {} before replacing it", target.display());
                        self.replaced.push(replaced);
                    }
                }
            }

            if record {
                info.record_file(entry.name.as_str());
            } else {
                debug!("{} already exists, not recording it", entry.name);
            }

            payload.extract_entry(&entry, &self.install_dir)?;
        }

        debug!("Extracted {} entries, recorded {}", payload.entry_count(), info.file_count());
        Ok(())
    }

    /// Write the recorded file list and the manifest below the list directory
    pub fn persist(&mut self, info: &PackageInfo) -> Result<()> {
        self.enter(InstallPhase::Persisting);

        create_dir_all(&self.list_dir).map_err(|e| {
            Error::IoError(format!(
                "Failed to create list directory {}: {}",
                self.list_dir.display(),
                e
            ))
        })?;

        write_file_list(&self.list_file, info.files()).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", self.list_file.display(), e))
        })?;

        fs::write(&self.manifest_file, &info.manifest).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", self.manifest_file.display(), e))
        })?;

        debug!("Wrote {} and {}", self.list_file.display(), self.manifest_file.display());
        Ok(())
    }

    /// Apply ownership (when configured) and make everything below `bin/` executable
    pub fn finalize(&mut self) -> Result<()> {
        self.enter(InstallPhase::Finalizing);

        if let Some(ownership) = self.ownership {
            chown_recursive(&self.install_dir, ownership)?;
            chown_recursive(&self.list_dir, ownership)?;
        }

        chmod_recursive(&self.install_dir.join("bin"), EXEC_MODE)?;
        Ok(())
    }

    /// One rollback attempt: remove what this transaction created
    fn remove_created(&self, files: &[String]) -> io::Result<()> {
        remove_recorded(&self.install_dir, files)?;

        for replaced in self.replaced.iter().rev() {
            replaced.restore()?;
        }

        if self.install_dir_existed {
            filesystem::remove_dir_if_empty(&self.install_dir)?;
        } else {
            remove_dir_all_if_exists(&self.install_dir)?;
        }

        if self.list_dir_existed {
            self.previous_list.restore(&self.list_file)?;
            self.previous_manifest.restore(&self.manifest_file)?;
        } else {
            remove_dir_all_if_exists(&self.list_dir)?;
        }

        Ok(())
    }
}

/// Write one recorded path per line, in recording order
fn write_file_list(path: &Path, files: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for file in files {
        writeln!(writer, "{}", file)?;
    }
    writer.flush()
}

fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if !matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::retry::ThreadSleeper;
    use crate::packages::{Package, PackageBuilder};
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }

    fn hello_package() -> Vec<u8> {
        PackageBuilder::new("hello")
            .directory("bin")
            .file("bin/hello", b"#!/bin/sh\necho hello\n".to_vec(), 0o644)
            .directory("data")
            .build()
            .unwrap()
    }

    #[test]
    fn test_phases_of_successful_transaction() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::from_root(temp_dir.path());
        let policy = RetryPolicy::no_retry();

        let bytes = hello_package();
        let mut package = Package::open(&bytes).unwrap();
        let payload = package.read_payload().unwrap();
        let mut archive = PayloadArchive::open(&payload).unwrap();

        let mut tx = Transaction::begin(&layout, "hello", None, &policy, &ThreadSleeper).unwrap();
        assert_eq!(tx.phase(), InstallPhase::Validating);

        tx.extract(package.info_mut(), &mut archive).unwrap();
        assert_eq!(tx.phase(), InstallPhase::Extracting);
        assert_eq!(package.info().files(), ["bin/", "bin/hello", "data/"]);

        tx.persist(package.info()).unwrap();
        assert_eq!(tx.phase(), InstallPhase::Persisting);
        assert_eq!(
            fs::read_to_string(layout.list_file("hello")).unwrap(),
            "bin/\nbin/hello\ndata/\n"
        );

        tx.finalize().unwrap();
        assert_eq!(tx.phase(), InstallPhase::Finalizing);
        let mode = fs::metadata(layout.install_dir("hello").join("bin/hello"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_failed_extraction_rolls_back_to_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::from_root(temp_dir.path());
        let policy = RetryPolicy::default();
        let sleeper = RecordingSleeper::default();

        // A file entry below a regular file cannot be extracted
        let bytes = PackageBuilder::new("broken")
            .file("bin/tool", b"tool".to_vec(), 0o755)
            .file("bin/tool/oops", b"x".to_vec(), 0o644)
            .build()
            .unwrap();
        let mut package = Package::open(&bytes).unwrap();
        let payload = package.read_payload().unwrap();
        let mut archive = PayloadArchive::open(&payload).unwrap();

        let mut tx = Transaction::begin(&layout, "broken", None, &policy, &sleeper).unwrap();
        let result = tx.run(package.info_mut(), &mut archive);

        assert!(matches!(result, Err(Error::IoError(_))));
        assert_eq!(tx.phase(), InstallPhase::Failed);
        assert!(!layout.install_dir("broken").exists());
        assert!(!layout.list_dir("broken").exists());
        assert!(sleeper.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_rollback_restores_previous_list() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::from_root(temp_dir.path());
        let policy = RetryPolicy::no_retry();

        fs::create_dir_all(layout.list_dir("hello")).unwrap();
        fs::write(layout.list_file("hello"), "old/\n").unwrap();
        fs::write(layout.manifest_file("hello"), "{}").unwrap();

        let bytes = hello_package();
        let mut package = Package::open(&bytes).unwrap();
        let payload = package.read_payload().unwrap();
        let mut archive = PayloadArchive::open(&payload).unwrap();

        let mut tx = Transaction::begin(&layout, "hello", None, &policy, &ThreadSleeper).unwrap();
        tx.extract(package.info_mut(), &mut archive).unwrap();
        tx.persist(package.info()).unwrap();
        tx.remove_created(package.info().files()).unwrap();

        assert_eq!(fs::read_to_string(layout.list_file("hello")).unwrap(), "old/\n");
        assert_eq!(fs::read_to_string(layout.manifest_file("hello")).unwrap(), "{}");
        assert!(!layout.install_dir("hello").exists());
    }

    #[test]
    fn test_rollback_gives_up_after_budget() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::from_root(temp_dir.path());
        let policy = RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(30));
        let sleeper = RecordingSleeper::default();

        fs::create_dir_all(layout.list_dir("hello")).unwrap();
        fs::write(layout.list_file("hello"), "old/\n").unwrap();

        let bytes = hello_package();
        let mut package = Package::open(&bytes).unwrap();
        let payload = package.read_payload().unwrap();
        let mut archive = PayloadArchive::open(&payload).unwrap();

        let mut tx = Transaction::begin(&layout, "hello", None, &policy, &sleeper).unwrap();

        // A file where the list directory was breaks persisting and the restore
        fs::remove_dir_all(layout.list_dir("hello")).unwrap();
        fs::write(layout.list_dir("hello"), b"in the way").unwrap();

        let result = tx.run(package.info_mut(), &mut archive);
        match result {
            Err(Error::RollbackIncomplete {
                package: name,
                attempts,
                cause,
            }) => {
                assert_eq!(name, "hello");
                assert_eq!(attempts, 3);
                assert!(matches!(*cause, Error::IoError(_)), "cause: {:?}", cause);
            }
            other => panic!("expected incomplete rollback, got {:?}", other),
        }

        assert_eq!(tx.phase(), InstallPhase::Failed);
        assert_eq!(
            *sleeper.sleeps.borrow(),
            vec![Duration::from_secs(10), Duration::from_secs(20)]
        );
        assert!(!layout.install_dir("hello").exists());
    }

    #[test]
    fn test_rollback_after_finalizing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::from_root(temp_dir.path());
        let policy = RetryPolicy::no_retry();

        let bytes = hello_package();
        let mut package = Package::open(&bytes).unwrap();
        let payload = package.read_payload().unwrap();
        let mut archive = PayloadArchive::open(&payload).unwrap();

        let mut tx = Transaction::begin(&layout, "hello", None, &policy, &ThreadSleeper).unwrap();
        tx.extract(package.info_mut(), &mut archive).unwrap();
        tx.persist(package.info()).unwrap();
        tx.finalize().unwrap();

        let error = tx.rollback(
            package.info(),
            Error::PermissionError("Failed to set owner".to_string()),
        );

        assert!(matches!(error, Error::PermissionError(_)));
        assert_eq!(tx.phase(), InstallPhase::Failed);
        assert!(!layout.install_dir("hello").exists());
        assert!(!layout.list_dir("hello").exists());
    }

    #[test]
    fn test_rollback_restores_replaced_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::from_root(temp_dir.path());
        let policy = RetryPolicy::no_retry();

        let old = layout.install_dir("hello").join("bin/hello");
        fs::create_dir_all(old.parent().unwrap()).unwrap();
        fs::write(&old, b"old hello").unwrap();
        fs::set_permissions(&old, fs::Permissions::from_mode(0o700)).unwrap();

        let bytes = hello_package();
        let mut package = Package::open(&bytes).unwrap();
        let payload = package.read_payload().unwrap();
        let mut archive = PayloadArchive::open(&payload).unwrap();

        let mut tx = Transaction::begin(&layout, "hello", None, &policy, &ThreadSleeper).unwrap();
        tx.extract(package.info_mut(), &mut archive).unwrap();
        assert_eq!(package.info().files(), ["bin/hello", "data/"]);
        tx.persist(package.info()).unwrap();
        tx.finalize().unwrap();

        let error = tx.rollback(package.info(), Error::PermissionError("denied".to_string()));
        assert!(matches!(error, Error::PermissionError(_)));

        assert_eq!(fs::read(&old).unwrap(), b"old hello");
        assert_eq!(fs::metadata(&old).unwrap().permissions().mode() & 0o777, 0o700);
        assert!(!layout.install_dir("hello").join("data").exists());
        assert!(!layout.list_dir("hello").exists());
    }
}
