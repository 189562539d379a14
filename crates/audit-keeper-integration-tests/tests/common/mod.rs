//! Common test utilities for audit-keeper integration tests
//!
//! This module provides:
//! - A filesystem-backed ledger rooted in a temporary directory
//! - Helpers for inspecting and tampering with store files on disk

use audit_keeper_core::{
    AuditEntry, AuditEventType, AuditLedger, FilesystemLedgerStorage, LedgerConfig, Sensitivity,
    StaticIdentityProvider,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Ledger over a temporary directory that is removed on drop
pub struct TestLedger {
    pub ledger: AuditLedger,
    pub dir: TempDir,
}

impl TestLedger {
    /// Open a filesystem ledger with default configuration
    pub async fn open() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let storage = FilesystemLedgerStorage::new(dir.path().to_path_buf())
            .await
            .expect("Failed to create storage");

        let ledger = AuditLedger::builder(Arc::new(storage))
            .with_identity(Arc::new(StaticIdentityProvider::new("integration-tester")))
            .build()
            .expect("Failed to build ledger");

        Self { ledger, dir }
    }

    /// Open through the public configuration path
    #[allow(dead_code)]
    pub async fn open_with_config(config: impl FnOnce(&mut LedgerConfig)) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut ledger_config = LedgerConfig::with_log_directory(dir.path());
        config(&mut ledger_config);

        let ledger = AuditLedger::open(&ledger_config)
            .await
            .expect("Failed to open ledger");
        Self { ledger, dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Live store files on disk, sorted by name
    #[allow(dead_code)]
    pub fn live_store_files(&self) -> Vec<PathBuf> {
        json_files_in(self.root())
            .into_iter()
            .filter(|p| file_name(p).starts_with("audit-"))
            .collect()
    }

    /// Archive files on disk, sorted by name
    #[allow(dead_code)]
    pub fn archive_files(&self) -> Vec<PathBuf> {
        json_files_in(&self.root().join("archive"))
    }

    /// Append an event and unwrap the result
    #[allow(dead_code)]
    pub async fn record(&self, event_type: AuditEventType, sensitivity: Sensitivity) -> AuditEntry {
        self.ledger
            .append(event_type, format!("{} for integration test", event_type), None, sensitivity)
            .await
            .expect("append failed")
            .expect("ledger disabled")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn json_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && file_name(p).ends_with(".json"))
        .collect();
    files.sort();
    files
}

/// Set a file's modified time `days` into the past
#[allow(dead_code)]
pub fn backdate(path: &Path, days: u64) {
    let when = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
    std::fs::File::options()
        .write(true)
        .open(path)
        .expect("Failed to open file")
        .set_modified(when)
        .expect("Failed to set modified time");
}
