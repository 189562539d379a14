//! # Filesystem Ledger Storage Adapter
//!
//! Local filesystem implementation of the LedgerStorage trait.

use crate::storage::{LedgerStorage, StorageError, StoredFile};
use crate::{Timestamp, Ulid};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Filesystem-based ledger storage
///
/// Relative paths are resolved against `base_path`.
///
/// # Examples
///
/// ```no_run
/// use audit_keeper_core::adapters::FilesystemLedgerStorage;
/// use std::path::PathBuf;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = FilesystemLedgerStorage::new(PathBuf::from("./data/audit")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemLedgerStorage {
    base_path: PathBuf,
}

impl FilesystemLedgerStorage {
    /// Create new filesystem ledger storage
    ///
    /// # Errors
    ///
    /// Returns error if base path cannot be created or accessed.
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| {
                StorageError::io(&base_path, format!("Failed to create base directory: {}", e))
            })?;

        Ok(Self { base_path })
    }

    /// Root directory of this storage
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl LedgerStorage for FilesystemLedgerStorage {
    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    async fn read_to_string(&self, path: &Path) -> Result<String, StorageError> {
        let full_path = self.resolve(path);
        let bytes = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    path: full_path.display().to_string(),
                }
            } else {
                StorageError::io(&full_path, e)
            }
        })?;

        String::from_utf8(bytes).map_err(|_| StorageError::InvalidEncoding {
            path: full_path.display().to_string(),
        })
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        let full_path = self.resolve(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| {
                    StorageError::io(
                        parent,
                        format!("Failed to create directory structure: {}", e),
                    )
                })?;
        }

        // Write to temporary file first (atomic write pattern)
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = full_path.with_file_name(format!(".{}.{}.tmp", file_name, Ulid::new()));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| {
                StorageError::io(&temp_path, format!("Failed to create temp file: {}", e))
            })?;

        let written = async {
            file.write_all(contents.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::io(&full_path, format!("Failed to write file: {}", e)));
        }

        // Rename to final path (atomic on most filesystems)
        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::io(&full_path, format!("Failed to rename temp file: {}", e)));
        }

        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), StorageError> {
        let full_path = self.resolve(path);
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| StorageError::io(&full_path, e))
    }

    async fn list_files(&self, dir: &Path) -> Result<Vec<StoredFile>, StorageError> {
        let full_dir = self.resolve(dir);
        let mut files = Vec::new();

        let mut read_dir = match fs::read_dir(&full_dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => {
                return Err(StorageError::io(
                    &full_dir,
                    format!("Failed to read directory: {}", e),
                ))
            }
        };

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| {
                StorageError::io(&full_dir, format!("Failed to read directory entry: {}", e))
            })?
        {
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let modified = metadata
                .modified()
                .map(Timestamp::from)
                .map_err(|e| StorageError::io(&entry.path(), e))?;

            files.push(StoredFile {
                path: dir.join(&name),
                name,
                modified,
                size_bytes: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        let full_path = self.resolve(path);
        fs::remove_file(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    path: full_path.display().to_string(),
                }
            } else {
                StorageError::io(&full_path, format!("Failed to delete file: {}", e))
            }
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_path.join(path)
    }
}

#[cfg(test)]
#[path = "filesystem_storage_tests.rs"]
mod tests;
