//! # In-Memory Ledger Storage
//!
//! Thread-safe in-memory implementation for testing and development.

use crate::storage::{LedgerStorage, StorageError, StoredFile};
use crate::Timestamp;
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Component, Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: String,
    modified: Timestamp,
}

#[derive(Debug, Default)]
struct MemoryTree {
    files: BTreeMap<PathBuf, MemoryFile>,
    dirs: BTreeSet<PathBuf>,
}

/// In-memory ledger storage
///
/// Clones share the same underlying files. Paths are normalized so `a/./b`
/// and `a/b` refer to the same file.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStorage {
    tree: Arc<RwLock<MemoryTree>>,
}

impl InMemoryLedgerStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the modified time of a stored file
    ///
    /// Returns `false` when the file does not exist.
    pub fn set_modified(&self, path: &Path, modified: Timestamp) -> bool {
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        match tree.files.get_mut(&normalize(path)) {
            Some(file) => {
                file.modified = modified;
                true
            }
            None => false,
        }
    }

    /// Number of stored files
    pub fn file_count(&self) -> usize {
        self.tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .files
            .len()
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[async_trait]
impl LedgerStorage for InMemoryLedgerStorage {
    async fn exists(&self, path: &Path) -> bool {
        let path = normalize(path);
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        tree.files.contains_key(&path) || tree.dirs.contains(&path)
    }

    async fn read_to_string(&self, path: &Path) -> Result<String, StorageError> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        tree.files
            .get(&normalize(path))
            .map(|file| file.contents.clone())
            .ok_or_else(|| StorageError::NotFound {
                path: path.display().to_string(),
            })
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        let path = normalize(path);
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);

        if tree.dirs.contains(&path) {
            return Err(StorageError::io(&path, "path is a directory"));
        }
        if let Some(parent) = path.parent() {
            for ancestor in parent.ancestors() {
                if !ancestor.as_os_str().is_empty() {
                    tree.dirs.insert(ancestor.to_path_buf());
                }
            }
        }

        tree.files.insert(
            path,
            MemoryFile {
                contents: contents.to_string(),
                modified: Timestamp::now(),
            },
        );
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), StorageError> {
        let path = normalize(path);
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                tree.dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }

    async fn list_files(&self, dir: &Path) -> Result<Vec<StoredFile>, StorageError> {
        let dir = normalize(dir);
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);

        // BTreeMap iteration keeps results sorted by path, hence by name
        let files = tree
            .files
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir.as_path()))
            .filter_map(|(path, file)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(StoredFile {
                    name,
                    path: path.clone(),
                    modified: file.modified,
                    size_bytes: file.contents.len() as u64,
                })
            })
            .collect();

        Ok(files)
    }

    async fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        tree.files
            .remove(&normalize(path))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                path: path.display().to_string(),
            })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        normalize(path)
    }
}

#[cfg(test)]
#[path = "memory_storage_tests.rs"]
mod tests;
