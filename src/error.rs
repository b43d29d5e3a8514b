// src/error.rs

use thiserror::Error;

/// Core error types for Parcel
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with path context (file open/write/extract failures)
    #[error("I/O error: {0}")]
    IoError(String),

    /// Missing or empty package source
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed top-level package or nested payload archive
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Payload digest does not match the checksum declared by the package
    #[error("Package validation failed: expected checksum {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Payload archive has no entries
    #[error("Payload archive is empty")]
    EmptyPayload,

    /// Ownership or mode fixup failed
    #[error("Permission error: {0}")]
    PermissionError(String),

    /// A buffer of the declared size could not be allocated
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Source string uses a schema the resolver does not handle
    #[error("Unsupported schema: {0}")]
    UnsupportedSchema(String),

    /// Remote package download failed
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Package is installed and updates were not requested
    #[error("Package '{0}' is already installed")]
    AlreadyInstalled(String),

    /// Package is not installed
    #[error("Not found: {0}")]
    NotFound(String),

    /// User declined the superuser confirmation
    #[error("Aborted by user")]
    Aborted,

    /// Rollback exhausted its retry budget; a partial install remains on disk
    #[error("Rollback of '{package}' incomplete after {attempts} attempts (install failed with: {cause})")]
    RollbackIncomplete {
        package: String,
        attempts: u32,
        cause: Box<Error>,
    },
}

/// Result type alias using Parcel's Error type
pub type Result<T> = std::result::Result<T, Error>;
