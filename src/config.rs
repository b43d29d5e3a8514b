// src/config.rs

//! Installer configuration
//!
//! The CLI builds this from flags and `PARCEL_*` environment variables;
//! library users construct it directly.

use crate::filesystem::{InstallLayout, Ownership};
use crate::install::RetryPolicy;
use std::path::Path;

/// Default data root holding `packages/` and `lists/`
pub const DEFAULT_ROOT: &str = "/var/lib/parcel";

/// Host used to resolve `git://owner/repo` sources
pub const DEFAULT_GIT_BASE_URL: &str = "https://github.com";

/// Ref used when a git source does not name one
pub const DEFAULT_GIT_REF: &str = "master";

#[derive(Debug, Clone)]
pub struct InstallerConfig {
    pub layout: InstallLayout,
    /// Owner applied to installed trees; `None` leaves ownership untouched
    pub ownership: Option<Ownership>,
    /// Retry policy for rollback cleanup
    pub rollback: RetryPolicy,
    pub git_base_url: String,
    pub git_default_ref: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self::with_root(DEFAULT_ROOT)
    }
}

impl InstallerConfig {
    /// Configuration with both bases below `root` and default everything else
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            layout: InstallLayout::from_root(root),
            ownership: None,
            rollback: RetryPolicy::default(),
            git_base_url: DEFAULT_GIT_BASE_URL.to_string(),
            git_default_ref: DEFAULT_GIT_REF.to_string(),
        }
    }
}
