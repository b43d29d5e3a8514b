// src/filesystem/mod.rs

//! Filesystem helpers for installation and removal
//!
//! This module provides:
//! - The name-keyed install layout
//! - Recursive directory creation with a fixed mode
//! - Recursive ownership and permission fixup
//! - Removal of recorded payload paths

pub mod layout;

pub use layout::InstallLayout;

use crate::error::{Error, Result};
use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Mode used for created directories and for files below `bin/`
pub const EXEC_MODE: u32 = 0o755;

/// Create a directory and all parents with mode 0755; existing is success
pub fn create_dir_all(path: &Path) -> io::Result<()> {
    fs::DirBuilder::new().recursive(true).mode(EXEC_MODE).create(path)
}

/// Owner and group applied to installed trees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
}

impl FromStr for Ownership {
    type Err = Error;

    /// Parse `UID:GID`, or a bare `UID` meaning the same numeric group
    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim().parse::<u32>().map_err(|_| {
                Error::InvalidArgument(format!("Invalid owner '{}': expected UID[:GID]", s))
            })
        };

        match s.split_once(':') {
            Some((uid, gid)) => Ok(Self::new(parse(uid)?, parse(gid)?)),
            None => {
                let uid = parse(s)?;
                Ok(Self::new(uid, uid))
            }
        }
    }
}

/// Change owner and group of every path below `root`, including `root`
///
/// Symlinks are not followed. A failed change is tolerated when the path
/// already has the requested owner and group. Returns the number of paths
/// visited; a missing `root` visits nothing.
pub fn chown_recursive(root: &Path, ownership: Ownership) -> Result<usize> {
    if fs::symlink_metadata(root).is_err() {
        debug!("Skipping ownership change, {} does not exist", root.display());
        return Ok(0);
    }

    let mut count = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::PermissionError(format!("Failed to walk {}: {}", root.display(), e))
        })?;
        let path = entry.path();

        if let Err(e) = std::os::unix::fs::lchown(path, Some(ownership.uid), Some(ownership.gid)) {
            let already_owned = fs::symlink_metadata(path)
                .is_ok_and(|m| m.uid() == ownership.uid && m.gid() == ownership.gid);

            if !already_owned {
                return Err(Error::PermissionError(format!(
                    "Failed to set owner {}:{} on {}: {}",
                    ownership.uid,
                    ownership.gid,
                    path.display(),
                    e
                )));
            }

            warn!("Ownership change on {} failed but owner already matches: {}", path.display(), e);
        }

        count += 1;
    }

    debug!("Set owner {}:{} on {} paths below {}", ownership.uid, ownership.gid, count, root.display());
    Ok(count)
}

/// Set `mode` on every regular file below `dir`
///
/// A missing `dir` is not an error. Returns the number of files changed.
pub fn chmod_recursive(dir: &Path, mode: u32) -> Result<usize> {
    if !dir.is_dir() {
        debug!("Skipping permission fixup, {} does not exist", dir.display());
        return Ok(0);
    }

    let mut count = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::PermissionError(format!("Failed to walk {}: {}", dir.display(), e))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode)).map_err(|e| {
            Error::PermissionError(format!(
                "Failed to set mode {:o} on {}: {}",
                mode,
                entry.path().display(),
                e
            ))
        })?;
        count += 1;
    }

    debug!("Set mode {:o} on {} files below {}", mode, count, dir.display());
    Ok(count)
}

/// Resolve a recorded entry name below `root`
///
/// Returns `None` for names that are absolute or contain `..`, so removal
/// can never reach outside `root`.
pub fn recorded_path(root: &Path, entry: &str) -> Option<PathBuf> {
    let relative = Path::new(entry.trim_end_matches('/'));
    let mut has_component = false;

    for component in relative.components() {
        match component {
            Component::Normal(_) => has_component = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    has_component.then(|| root.join(relative))
}

/// Remove recorded payload entries below `root`, newest first
///
/// Files are unlinked; directories are removed only when empty. Paths that
/// are already gone are skipped.
pub fn remove_recorded(root: &Path, files: &[String]) -> io::Result<()> {
    for entry in files.iter().rev() {
        let Some(path) = recorded_path(root, entry) else {
            warn!("Not removing unsafe recorded path '{}'", entry);
            continue;
        };

        let result = if entry.ends_with('/') {
            fs::remove_dir(&path)
        } else {
            fs::remove_file(&path)
        };

        match result {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if is_absent(&e) => {}
            Err(e) if matches!(e.kind(), ErrorKind::DirectoryNotEmpty | ErrorKind::IsADirectory) => {
                debug!("Keeping {}: {}", path.display(), e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Remove a file, treating a missing file as success
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if !is_absent(&e) => Err(e),
        _ => Ok(()),
    }
}

/// Remove an empty directory; missing or non-empty directories are left alone
pub fn remove_dir_if_empty(path: &Path) -> io::Result<()> {
    match fs::remove_dir(path) {
        Err(e) if !is_absent(&e) && e.kind() != ErrorKind::DirectoryNotEmpty => Err(e),
        _ => Ok(()),
    }
}

/// Remove every empty directory below `root` and then `root` itself if empty
pub fn prune_empty_dirs(root: &Path) -> io::Result<()> {
    if !root.is_dir() {
        return Ok(());
    }

    for entry in WalkDir::new(root).follow_links(false).contents_first(true) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_dir() {
            remove_dir_if_empty(entry.path())?;
        }
    }

    Ok(())
}

fn is_absent(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}
