// Storage Interface - Durable file abstraction for ledger stores
//
// The ledger only needs whole-file reads and writes plus directory listing.
// Paths handed to a LedgerStorage are relative to the storage root; absolute
// paths are used as given.

use crate::Timestamp;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File entry returned by [`LedgerStorage::list_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// File name without directory
    pub name: String,

    /// Path relative to the storage root
    pub path: PathBuf,

    /// Last write time
    pub modified: Timestamp,

    /// Size in bytes
    pub size_bytes: u64,
}

/// Interface for ledger file persistence
///
/// Writes must be atomic: a concurrent reader observes either the previous or
/// the new contents, never a partial file.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Check whether a file or directory exists
    async fn exists(&self, path: &Path) -> bool;

    /// Read a whole file as UTF-8
    async fn read_to_string(&self, path: &Path) -> Result<String, StorageError>;

    /// Replace a whole file, creating parent directories as needed
    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), StorageError>;

    /// Create a directory and its parents
    async fn create_dir_all(&self, path: &Path) -> Result<(), StorageError>;

    /// List regular files directly inside `dir`, sorted by name
    ///
    /// A missing directory yields an empty list.
    async fn list_files(&self, dir: &Path) -> Result<Vec<StoredFile>, StorageError>;

    /// Delete a file
    async fn remove_file(&self, path: &Path) -> Result<(), StorageError>;

    /// Location of `path` as seen by the caller
    fn resolve(&self, path: &Path) -> PathBuf;
}

/// Errors from storage backends
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid UTF-8 content in {path}")]
    InvalidEncoding { path: String },
}

impl StorageError {
    /// Build an I/O error for `path`
    pub fn io(path: &Path, error: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }

    /// Check if error is transient and the operation may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
