// src/source/mod.rs

//! Package source resolution
//!
//! A source string names where a package comes from:
//!
//! - `git://owner/repo[@ref]` or `github:owner/repo[@ref]`
//! - `file:///path/to/package.zip`
//! - a plain filesystem path

pub mod download;

pub use download::DownloadClient;

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tempfile::NamedTempFile;

/// File fetched from a git repository
pub const PACKAGE_FILE_NAME: &str = "package.zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Local,
    File,
    Git,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Package bytes already in memory
    Local(Vec<u8>),
    /// Package file on disk
    File(PathBuf),
    /// Package published in a git repository
    Git(GitSource),
}

/// `owner/repo` with an optional branch, tag or commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub owner: String,
    pub repo: String,
    pub reference: Option<String>,
}

impl GitSource {
    /// Parse `owner/repo[@ref]`; a trailing `.git` on the repository is dropped
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidArgument(format!(
                "Invalid git source '{}': expected owner/repo[@ref]",
                spec
            ))
        };

        let (path, reference) = match spec.split_once('@') {
            Some((path, reference)) if !reference.is_empty() => (path, Some(reference.to_string())),
            Some(_) => return Err(invalid()),
            None => (spec, None),
        };

        let (owner, repo) = path.trim_end_matches('/').split_once('/').ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        let valid = [Some(owner), Some(repo), reference.as_deref()]
            .into_iter()
            .flatten()
            .all(is_url_segment);
        if !valid {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference,
        })
    }

    /// Raw download URL of the repository's package file
    pub fn package_url(&self, base_url: &str, default_ref: &str) -> String {
        format!(
            "{}/{}/{}/raw/{}/{}",
            base_url.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.reference.as_deref().unwrap_or(default_ref),
            PACKAGE_FILE_NAME
        )
    }
}

/// A single non-traversing URL path segment
fn is_url_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | '?' | '#' | '%'))
}

impl fmt::Display for GitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(reference) = &self.reference {
            write!(f, "@{}", reference)?;
        }
        Ok(())
    }
}

impl Source {
    /// Parse a source string
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidArgument("Empty package source".to_string()));
        }

        if let Some(spec) = url.strip_prefix("git://") {
            return Ok(Self::Git(GitSource::parse(spec)?));
        }
        if let Some(spec) = url.strip_prefix("github:") {
            return Ok(Self::Git(GitSource::parse(spec)?));
        }
        if let Some(path) = url.strip_prefix("file://") {
            if path.is_empty() {
                return Err(Error::InvalidArgument(format!("Invalid file source '{}'", url)));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }

        match url.split_once("://") {
            Some((schema, _)) => Err(Error::UnsupportedSchema(schema.to_string())),
            None => Ok(Self::File(PathBuf::from(url))),
        }
    }

    pub fn schema(&self) -> Schema {
        match self {
            Self::Local(_) => Schema::Local,
            Self::File(_) => Schema::File,
            Self::Git(_) => Schema::Git,
        }
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Download a git source's package file to a temporary file
pub fn fetch_git(git: &GitSource, base_url: &str, default_ref: &str) -> Result<NamedTempFile> {
    let url = git.package_url(base_url, default_ref);
    DownloadClient::new()?.download_to_temp(&url)
}
