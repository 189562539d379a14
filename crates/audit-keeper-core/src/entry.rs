// Audit Entry Model - Immutable, hash-chained audit records
//
// Every compliance-relevant event becomes one AuditEntry. Entries are linked
// to their predecessor in the same store through `previous_hash`, and the
// `integrity_hash` covers every canonical field so any later edit is
// detectable.

use crate::{AuditEntryId, ParseError, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use subtle::ConstantTimeEq;

// ============================================================================
// Core Types
// ============================================================================

/// Immutable audit ledger record
///
/// Field names are serialized in PascalCase; this is the on-disk format of
/// the live and archive stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditEntry {
    /// Unique identifier for this entry
    pub id: AuditEntryId,

    /// When the entry was appended
    pub timestamp: Timestamp,

    /// Category of the audited event
    pub event_type: AuditEventType,

    /// Free-text summary
    pub description: String,

    /// Optional side-channel payload, stored verbatim
    pub metadata: Option<String>,

    /// Confidentiality level of the entry content
    pub sensitivity: Sensitivity,

    /// Regulatory category derived at append time
    pub compliance_type: ComplianceType,

    /// One-way hash of the acting identity
    pub actor_id: String,

    /// Integrity hash of the predecessor in the same store (empty for the first)
    #[serde(default)]
    pub previous_hash: String,

    /// Digest over the canonical fields and `previous_hash`
    pub integrity_hash: String,

    /// Instant after which the entry is eligible for archival or deletion
    pub retention_expiry: Timestamp,
}

/// Entry fields fixed before the chain link is known
#[derive(Debug, Clone)]
pub(crate) struct UnsealedEntry {
    pub timestamp: Timestamp,
    pub event_type: AuditEventType,
    pub description: String,
    pub metadata: Option<String>,
    pub sensitivity: Sensitivity,
    pub compliance_type: ComplianceType,
    pub actor_id: String,
    pub retention_expiry: Timestamp,
}

impl AuditEntry {
    /// Link an unsealed entry to its predecessor and compute its digest
    pub(crate) fn seal(unsealed: UnsealedEntry, previous_hash: String) -> Self {
        let mut entry = Self {
            id: AuditEntryId::new(),
            timestamp: unsealed.timestamp,
            event_type: unsealed.event_type,
            description: unsealed.description,
            metadata: unsealed.metadata,
            sensitivity: unsealed.sensitivity,
            compliance_type: unsealed.compliance_type,
            actor_id: unsealed.actor_id,
            previous_hash,
            integrity_hash: String::new(),
            retention_expiry: unsealed.retention_expiry,
        };
        entry.integrity_hash = entry.compute_integrity_hash();
        entry
    }

    /// Recompute the digest from this entry's fields
    ///
    /// Each field is length-prefixed before hashing so that no two distinct
    /// field sequences share an encoding.
    pub fn compute_integrity_hash(&self) -> String {
        let metadata = self.metadata.as_deref().unwrap_or_default();
        let event_code = self.event_type.code().to_string();
        let timestamp = self.timestamp.to_canonical_string();
        let expiry = self.retention_expiry.to_canonical_string();
        let id = self.id.as_str();

        let fields: [&str; 10] = [
            &id,
            &timestamp,
            &event_code,
            &self.description,
            metadata,
            self.sensitivity.as_str(),
            self.compliance_type.as_str(),
            &self.actor_id,
            &expiry,
            &self.previous_hash,
        ];

        let mut hasher = Sha256::new();
        for field in fields {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Check the stored digest against a recomputation
    pub fn verify_digest(&self) -> bool {
        let expected = self.compute_integrity_hash();
        expected
            .as_bytes()
            .ct_eq(self.integrity_hash.as_bytes())
            .into()
    }

    /// Check if this entry is chained directly after `previous`
    pub fn follows(&self, previous: &AuditEntry) -> bool {
        !self.previous_hash.is_empty() && self.previous_hash == previous.integrity_hash
    }

    /// Check if the retention window has elapsed at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.retention_expiry <= now
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Type of event being audited
///
/// Serialized as an integer code. Codes that do not name a known variant are
/// preserved as [`AuditEventType::Unknown`] and treated as uncategorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum AuditEventType {
    ApplicationStarted,
    ApplicationStopped,
    TranscriptionStarted,
    TranscriptionCompleted,
    TranscriptionFailed,
    TextInjected,
    ApiKeyAccessed,
    ApiKeyRotated,
    SettingsChanged,
    UserLogin,
    UserLogout,
    AuthenticationFailed,
    DataAccessed,
    DataExported,
    DataDeleted,
    SecurityEvent,
    Error,

    /// Unregistered event code
    Unknown(i32),
}

impl AuditEventType {
    /// All registered event types, in code order
    pub const KNOWN: [AuditEventType; 17] = [
        Self::ApplicationStarted,
        Self::ApplicationStopped,
        Self::TranscriptionStarted,
        Self::TranscriptionCompleted,
        Self::TranscriptionFailed,
        Self::TextInjected,
        Self::ApiKeyAccessed,
        Self::ApiKeyRotated,
        Self::SettingsChanged,
        Self::UserLogin,
        Self::UserLogout,
        Self::AuthenticationFailed,
        Self::DataAccessed,
        Self::DataExported,
        Self::DataDeleted,
        Self::SecurityEvent,
        Self::Error,
    ];

    /// Integer code used on disk
    pub fn code(self) -> i32 {
        match self {
            Self::ApplicationStarted => 0,
            Self::ApplicationStopped => 1,
            Self::TranscriptionStarted => 2,
            Self::TranscriptionCompleted => 3,
            Self::TranscriptionFailed => 4,
            Self::TextInjected => 5,
            Self::ApiKeyAccessed => 6,
            Self::ApiKeyRotated => 7,
            Self::SettingsChanged => 8,
            Self::UserLogin => 9,
            Self::UserLogout => 10,
            Self::AuthenticationFailed => 11,
            Self::DataAccessed => 12,
            Self::DataExported => 13,
            Self::DataDeleted => 14,
            Self::SecurityEvent => 15,
            Self::Error => 16,
            Self::Unknown(code) => code,
        }
    }

    /// Map an integer code to its event type
    pub fn from_code(code: i32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::KNOWN.get(index).copied())
            .unwrap_or(Self::Unknown(code))
    }

    /// Check if this is a registered event type
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Variant name, `None` for unknown codes
    pub fn name(&self) -> Option<&'static str> {
        let name = match self {
            Self::ApplicationStarted => "ApplicationStarted",
            Self::ApplicationStopped => "ApplicationStopped",
            Self::TranscriptionStarted => "TranscriptionStarted",
            Self::TranscriptionCompleted => "TranscriptionCompleted",
            Self::TranscriptionFailed => "TranscriptionFailed",
            Self::TextInjected => "TextInjected",
            Self::ApiKeyAccessed => "ApiKeyAccessed",
            Self::ApiKeyRotated => "ApiKeyRotated",
            Self::SettingsChanged => "SettingsChanged",
            Self::UserLogin => "UserLogin",
            Self::UserLogout => "UserLogout",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::DataAccessed => "DataAccessed",
            Self::DataExported => "DataExported",
            Self::DataDeleted => "DataDeleted",
            Self::SecurityEvent => "SecurityEvent",
            Self::Error => "Error",
            Self::Unknown(_) => return None,
        };
        Some(name)
    }
}

impl From<i32> for AuditEventType {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl From<AuditEventType> for i32 {
    fn from(event_type: AuditEventType) -> Self {
        event_type.code()
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "Unknown({})", self.code()),
        }
    }
}

impl FromStr for AuditEventType {
    type Err = ParseError;

    /// Accepts a variant name (case-insensitive) or an integer code
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<i32>() {
            return Ok(Self::from_code(code));
        }

        Self::KNOWN
            .iter()
            .copied()
            .find(|known| {
                known
                    .name()
                    .is_some_and(|name| name.eq_ignore_ascii_case(s.trim()))
            })
            .ok_or_else(|| ParseError::UnknownVariant {
                kind: "event type".to_string(),
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Classification Types
// ============================================================================

/// Ordered confidentiality level of an entry
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Sensitivity {
    Public,
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Sensitivity {
    /// Stable name used in hashes and display
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sensitivity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ParseError::UnknownVariant {
                kind: "sensitivity".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Regulatory category governing how long an entry is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComplianceType {
    General,
    #[serde(rename = "HIPAA")]
    Hipaa,
    #[serde(rename = "GDPR")]
    Gdpr,
    #[serde(rename = "SOC2")]
    Soc2,
}

impl ComplianceType {
    /// Stable name used in hashes and display
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Hipaa => "HIPAA",
            Self::Gdpr => "GDPR",
            Self::Soc2 => "SOC2",
        }
    }
}

impl fmt::Display for ComplianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ComplianceType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GENERAL" => Ok(Self::General),
            "HIPAA" => Ok(Self::Hipaa),
            "GDPR" => Ok(Self::Gdpr),
            "SOC2" | "SOC 2" => Ok(Self::Soc2),
            _ => Err(ParseError::UnknownVariant {
                kind: "compliance type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
