//! # Hash-Chain Append Engine
//!
//! [`AuditLedger`] owns the live stores. Each append classifies the event,
//! resolves its retention expiry and links it to the last entry of its store.
//!
//! ## Concurrency
//!
//! Every physical store has its own async mutex guarding a [`StoreCursor`].
//! The read-hash-write sequence for a store runs while that mutex is held, so
//! appends to one store are totally ordered while appends to different
//! stores proceed in parallel. The lock table belongs to the ledger
//! instance; two ledgers never share cursors.

use crate::adapters::FilesystemLedgerStorage;
use crate::classifier::ComplianceClassifier;
use crate::config::{ConfigError, LedgerConfig, Rollover};
use crate::entry::{AuditEntry, AuditEventType, Sensitivity, UnsealedEntry};
use crate::identity::{Clock, IdentityProvider, OsIdentityProvider, SystemClock};
use crate::retention::{PolicyError, RetentionPolicy, RetentionPolicyEngine};
use crate::storage::{LedgerStorage, StorageError};
use crate::Timestamp;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prefix shared by live store file names
pub(crate) const STORE_PREFIX: &str = "audit-";

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by ledger operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid retention policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Store '{path}' is corrupt: {message}")]
    CorruptStore { path: String, message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },
}

impl LedgerError {
    /// Check if error is transient and the operation may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Policy(_)
            | Self::Configuration(_)
            | Self::CorruptStore { .. }
            | Self::Serialization { .. } => false,
        }
    }
}

// ============================================================================
// Append Request
// ============================================================================

/// Event to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRequest {
    pub event_type: AuditEventType,
    pub description: String,
    pub metadata: Option<String>,
    pub sensitivity: Sensitivity,
}

impl AppendRequest {
    /// Create request with no metadata and default sensitivity
    pub fn new(event_type: AuditEventType, description: impl Into<String>) -> Self {
        Self {
            event_type,
            description: description.into(),
            metadata: None,
            sensitivity: Sensitivity::default(),
        }
    }

    /// Attach metadata, stored verbatim
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Set sensitivity
    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }
}

// ============================================================================
// Store Locks
// ============================================================================

/// Last hash written to a store by this ledger
#[derive(Debug, Default)]
pub(crate) struct StoreCursor {
    pub last_hash: Option<String>,
}

type StoreLock = Arc<tokio::sync::Mutex<StoreCursor>>;

/// Lazily populated table of per-store locks
#[derive(Debug, Default)]
pub(crate) struct StoreLocks {
    table: Mutex<HashMap<PathBuf, StoreLock>>,
}

impl StoreLocks {
    /// Lock guarding `path`, created on first use
    pub fn for_store(&self, path: &Path) -> StoreLock {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(path.to_path_buf()).or_default().clone()
    }

    /// Drop the lock for a deleted file unless another task still holds it
    ///
    /// Callers must have released their own guard and handle first.
    pub fn release(&self, path: &Path) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table
            .get(path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(path);
        }
    }

    /// Number of paths with a lock entry
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Tamper-evident audit ledger
///
/// Cheap operations (`is_enabled`, `policies`) never touch storage. All other
/// operations are async and read or write store files through the injected
/// [`LedgerStorage`].
pub struct AuditLedger {
    pub(crate) storage: Arc<dyn LedgerStorage>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    classifier: ComplianceClassifier,
    policies: RetentionPolicyEngine,
    rollover: Rollover,
    pub(crate) archive_dir: PathBuf,
    pub(crate) export_dir: PathBuf,
    enabled: AtomicBool,
    pub(crate) locks: StoreLocks,
}

impl std::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("rollover", &self.rollover)
            .field("archive_dir", &self.archive_dir)
            .field("export_dir", &self.export_dir)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl AuditLedger {
    /// Open a filesystem-backed ledger rooted at `config.log_directory`
    pub async fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;

        let storage = FilesystemLedgerStorage::new(config.log_directory.clone()).await?;
        let ledger = AuditLedgerBuilder::from_config(Arc::new(storage), config).build()?;

        info!(
            log_directory = %config.log_directory.display(),
            rollover = ?config.rollover,
            enabled = config.enabled,
            "Audit ledger opened"
        );
        Ok(ledger)
    }

    /// Start building a ledger over `storage`
    pub fn builder(storage: Arc<dyn LedgerStorage>) -> AuditLedgerBuilder {
        AuditLedgerBuilder::new(storage)
    }

    /// Enable or disable recording
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "Audit logging toggled");
        }
    }

    /// Check whether appends are recorded
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Retention policy table
    pub fn policies(&self) -> &RetentionPolicyEngine {
        &self.policies
    }

    /// Add or replace a retention policy
    pub fn configure_policy(&self, policy: RetentionPolicy) -> Result<(), LedgerError> {
        self.policies.configure(policy)?;
        Ok(())
    }

    /// Classifier used for new entries
    pub fn classifier(&self) -> &ComplianceClassifier {
        &self.classifier
    }

    /// Current time according to the ledger clock
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Record an event
    ///
    /// Returns `Ok(None)` without touching storage while the ledger is
    /// disabled.
    pub async fn append(
        &self,
        event_type: AuditEventType,
        description: impl Into<String>,
        metadata: Option<String>,
        sensitivity: Sensitivity,
    ) -> Result<Option<AuditEntry>, LedgerError> {
        self.append_event(AppendRequest {
            event_type,
            description: description.into(),
            metadata,
            sensitivity,
        })
        .await
    }

    /// Record an event described by `request`
    pub async fn append_event(
        &self,
        request: AppendRequest,
    ) -> Result<Option<AuditEntry>, LedgerError> {
        if !self.is_enabled() {
            debug!(event_type = %request.event_type, "Audit logging disabled, append skipped");
            return Ok(None);
        }

        let timestamp = self.clock.now();
        let compliance_type = self
            .classifier
            .classify(request.event_type, request.sensitivity);
        let retention_expiry =
            self.policies
                .resolve_expiry(request.event_type, compliance_type, timestamp);

        let unsealed = UnsealedEntry {
            timestamp,
            event_type: request.event_type,
            description: request.description,
            metadata: request.metadata,
            sensitivity: request.sensitivity,
            compliance_type,
            actor_id: self.identity.actor_id(),
            retention_expiry,
        };

        let store = self.store_path_for(timestamp);
        let lock = self.locks.for_store(&store);
        let mut cursor = lock.lock().await;

        let mut entries = self.read_store(&store).await?;
        let disk_tail = entries.last().map(|e| e.integrity_hash.clone());

        if let Some(expected) = &cursor.last_hash {
            if disk_tail.as_ref() != Some(expected) {
                warn!(
                    store = %store.display(),
                    "Store tail differs from last recorded hash; chaining to on-disk tail"
                );
            }
        }

        let entry = AuditEntry::seal(unsealed, disk_tail.unwrap_or_default());
        entries.push(entry.clone());
        self.write_store(&store, &entries).await?;
        cursor.last_hash = Some(entry.integrity_hash.clone());

        debug!(
            entry_id = %entry.id,
            event_type = %entry.event_type,
            compliance_type = %entry.compliance_type,
            store = %store.display(),
            "Audit entry appended"
        );

        Ok(Some(entry))
    }

    // ------------------------------------------------------------------------
    // Store helpers shared with the sweep and query modules
    // ------------------------------------------------------------------------

    /// Live store holding entries appended at `timestamp`
    pub(crate) fn store_path_for(&self, timestamp: Timestamp) -> PathBuf {
        PathBuf::from(self.rollover.store_file_name(timestamp))
    }

    /// Read a store; a missing or empty file is an empty store
    pub(crate) async fn read_store(&self, path: &Path) -> Result<Vec<AuditEntry>, LedgerError> {
        let contents = match self.storage.read_to_string(path).await {
            Ok(contents) => contents,
            Err(StorageError::NotFound { .. }) => return Ok(Vec::new()),
            Err(StorageError::InvalidEncoding { path }) => {
                return Err(LedgerError::CorruptStore {
                    path,
                    message: "not valid UTF-8".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|e| LedgerError::CorruptStore {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Replace a store's contents
    pub(crate) async fn write_store(
        &self,
        path: &Path,
        entries: &[AuditEntry],
    ) -> Result<(), LedgerError> {
        let contents =
            serde_json::to_string_pretty(entries).map_err(|e| LedgerError::Serialization {
                message: e.to_string(),
            })?;
        self.storage.write_atomic(path, &contents).await?;
        Ok(())
    }

    /// Hashes of entries sweeps removed from `store`, each mapped to that
    /// entry's own `previous_hash`
    ///
    /// A missing record is empty.
    pub(crate) async fn read_removal_record(
        &self,
        store: &Path,
    ) -> Result<RemovalRecord, LedgerError> {
        let path = removal_record_path(store);
        let contents = match self.storage.read_to_string(&path).await {
            Ok(contents) => contents,
            Err(StorageError::NotFound { .. }) => return Ok(RemovalRecord::new()),
            Err(StorageError::InvalidEncoding { path }) => {
                return Err(LedgerError::CorruptStore {
                    path,
                    message: "not valid UTF-8".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents).map_err(|e| LedgerError::CorruptStore {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Replace the removal record of `store`
    pub(crate) async fn write_removal_record(
        &self,
        store: &Path,
        record: &RemovalRecord,
    ) -> Result<(), LedgerError> {
        let contents =
            serde_json::to_string_pretty(record).map_err(|e| LedgerError::Serialization {
                message: e.to_string(),
            })?;
        self.storage
            .write_atomic(&removal_record_path(store), &contents)
            .await?;
        Ok(())
    }

    /// All live store files, sorted by name
    pub(crate) async fn live_store_paths(&self) -> Result<Vec<PathBuf>, LedgerError> {
        let files = self.storage.list_files(Path::new("")).await?;
        Ok(files
            .into_iter()
            .filter(|file| is_live_store_name(&file.name))
            .map(|file| file.path)
            .collect())
    }
}

/// Removed entry hash to the hash that entry linked to
pub(crate) type RemovalRecord = BTreeMap<String, String>;

/// Hidden sidecar next to `store` recording what sweeps removed from it
pub(crate) fn removal_record_path(store: &Path) -> PathBuf {
    let name = store
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    store.with_file_name(format!(".{}.removed", name))
}

/// Check whether a file name matches the live store pattern
pub(crate) fn is_live_store_name(name: &str) -> bool {
    name.starts_with(STORE_PREFIX)
        && name.ends_with(".json")
        && !name.starts_with("audit-archive-")
        && !name.starts_with("audit-export-")
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`AuditLedger`]
///
/// Defaults: system clock, OS identity, built-in classifier and policies,
/// daily rollover, enabled.
pub struct AuditLedgerBuilder {
    storage: Arc<dyn LedgerStorage>,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn IdentityProvider>,
    classifier: ComplianceClassifier,
    policies: Vec<RetentionPolicy>,
    default_retention_days: u32,
    rollover: Rollover,
    archive_dir: PathBuf,
    export_dir: PathBuf,
    enabled: bool,
}

impl AuditLedgerBuilder {
    /// Create builder with default collaborators
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        let defaults = LedgerConfig::default();
        Self {
            storage,
            clock: Arc::new(SystemClock),
            identity: Arc::new(OsIdentityProvider::new()),
            classifier: ComplianceClassifier::new(),
            policies: Vec::new(),
            default_retention_days: defaults.default_retention_days,
            rollover: defaults.rollover,
            archive_dir: defaults.archive_directory,
            export_dir: defaults.export_directory,
            enabled: defaults.enabled,
        }
    }

    /// Create builder with settings taken from `config`
    pub fn from_config(storage: Arc<dyn LedgerStorage>, config: &LedgerConfig) -> Self {
        let mut builder = Self::new(storage)
            .with_rollover(config.rollover)
            .with_archive_directory(config.archive_directory.clone())
            .with_export_directory(config.export_directory.clone())
            .with_default_retention_days(config.default_retention_days)
            .enabled(config.enabled);

        for rule in &config.classifier_overrides {
            builder.classifier.register(rule.event_type, rule.compliance_type);
        }
        builder.policies.extend(config.policies.iter().cloned());
        builder
    }

    /// Use `clock` for timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `identity` for actor ids
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    /// Replace the classifier
    pub fn with_classifier(mut self, classifier: ComplianceClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Add or replace a retention policy
    pub fn with_policy(mut self, policy: RetentionPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Retention used when no policy applies
    pub fn with_default_retention_days(mut self, days: u32) -> Self {
        self.default_retention_days = days;
        self
    }

    /// Live store rollover period
    pub fn with_rollover(mut self, rollover: Rollover) -> Self {
        self.rollover = rollover;
        self
    }

    /// Archive directory, relative to the storage root
    pub fn with_archive_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    /// Default export directory, relative to the storage root
    pub fn with_export_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    /// Initial enabled state
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build the ledger
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Policy`] if an added policy is invalid.
    pub fn build(self) -> Result<AuditLedger, LedgerError> {
        let policies = RetentionPolicyEngine::new(self.default_retention_days);
        for policy in self.policies {
            policies.configure(policy)?;
        }

        Ok(AuditLedger {
            storage: self.storage,
            clock: self.clock,
            identity: self.identity,
            classifier: self.classifier,
            policies,
            rollover: self.rollover,
            archive_dir: self.archive_dir,
            export_dir: self.export_dir,
            enabled: AtomicBool::new(self.enabled),
            locks: StoreLocks::default(),
        })
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
