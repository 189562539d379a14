//! # Audit-Keeper Core
//!
//! Core engine for the Audit-Keeper tamper-evident audit ledger.
//!
//! This crate records compliance-relevant events into hash-chained, file-backed
//! stores, proves after the fact that no entry was altered, and ages entries out
//! according to regulation-specific retention schedules (HIPAA, GDPR, SOC 2).
//!
//! ## Architecture
//!
//! The core follows clean architecture principles:
//! - The ledger depends only on trait abstractions ([`LedgerStorage`], [`Clock`],
//!   [`IdentityProvider`])
//! - Infrastructure implementations are injected at runtime
//! - Writes flow caller → classifier → retention engine → ledger → storage
//!
//! ## Usage
//!
//! ```no_run
//! use audit_keeper_core::{AuditEventType, AuditLedger, LedgerConfig, Sensitivity};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = AuditLedger::open(&LedgerConfig::default()).await?;
//!
//! let entry = ledger
//!     .append(
//!         AuditEventType::ApiKeyAccessed,
//!         "API key read for transcription",
//!         None,
//!         Sensitivity::Critical,
//!     )
//!     .await?;
//!
//! if let Some(entry) = entry {
//!     assert!(ledger.verify_integrity(&entry.id).await);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Datelike, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

// Re-export commonly used types
pub use ulid::Ulid;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier for audit ledger entries
///
/// Uses ULID for lexicographic sorting and global uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuditEntryId(Ulid);

impl AuditEntryId {
    /// Generate a new unique entry ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get string representation of entry ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    /// Get underlying ULID
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AuditEntryId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s.parse::<Ulid>().map_err(|_| ParseError::InvalidFormat {
            expected: "ULID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(ulid))
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with nanosecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing UTC datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Fixed-width RFC3339 form used as hash input
    ///
    /// Always nanosecond precision with a `Z` suffix so the same instant
    /// always produces the same bytes.
    pub fn to_canonical_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Add whole days to timestamp, saturating at the latest representable instant
    pub fn add_days(&self, days: u32) -> Self {
        let shifted = TimeDelta::try_days(i64::from(days))
            .and_then(|delta| self.0.checked_add_signed(delta));
        Self(shifted.unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Subtract whole days from timestamp, saturating at the earliest representable instant
    pub fn subtract_days(&self, days: u32) -> Self {
        let shifted = TimeDelta::try_days(i64::from(days))
            .and_then(|delta| self.0.checked_sub_signed(delta));
        Self(shifted.unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    /// Get year component
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Get month component (1-12)
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Get day component (1-31)
    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Format with a chrono format string
    pub fn format(&self, fmt: &str) -> String {
        self.0.format(fmt).to_string()
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Self(DateTime::<Utc>::from(time))
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> Self {
        ts.0.into()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_rfc3339(s)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for string parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },

    #[error("Unknown {kind}: '{value}'")]
    UnknownVariant { kind: String, value: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Audit entry model and integrity hashing
pub mod entry;

/// Clock and actor identity providers
pub mod identity;

/// Event classification into compliance categories
pub mod classifier;

/// Retention policy table and resolution
pub mod retention;

/// Storage abstraction for ledger files
pub mod storage;

/// Storage adapters module for infrastructure implementations
pub mod adapters;

/// Ledger configuration
pub mod config;

/// Hash-chain append engine
pub mod ledger;

/// Retention sweeps, archival and purge
pub mod archive;

/// Query, statistics, export and verification
pub mod query;

// Re-export key types for convenience
pub use adapters::{FilesystemLedgerStorage, InMemoryLedgerStorage};
pub use classifier::ComplianceClassifier;
pub use config::{ClassifierOverride, ConfigError, LedgerConfig, Rollover};
pub use entry::{AuditEntry, AuditEventType, ComplianceType, Sensitivity};
pub use identity::{
    hash_actor, Clock, FixedClock, IdentityProvider, OsIdentityProvider, StaticIdentityProvider,
    SystemClock,
};
pub use ledger::{AppendRequest, AuditLedger, AuditLedgerBuilder, LedgerError};
pub use query::{
    AuditStatistics, ChainVerificationResult, ExportDocument, ExportMetadata, LogQuery,
};
pub use retention::{PolicyError, RetentionPolicy, RetentionPolicyEngine, MAX_RETENTION_DAYS};
pub use storage::{LedgerStorage, StorageError, StoredFile};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
