//! # Retention Policy Engine
//!
//! Holds the table of named retention policies and resolves, for any entry,
//! which policy applies and when the entry expires.
//!
//! A policy matches an entry when the entry's compliance type is listed in
//! `applicable_compliance_types` or its event type is listed in
//! `applicable_event_types`. When several policies match:
//! 1. event-type matches take precedence over compliance-type matches
//! 2. within a tier, the shortest `retention_days` wins
//! 3. remaining ties go to the lexicographically smallest `id`

use crate::entry::{AuditEventType, ComplianceType};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::info;

/// Id of the fallback policy used when nothing else matches
pub const GENERAL_POLICY_ID: &str = "general";

/// Longest retention or archive window a policy may ask for (100 years)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Named retention rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Unique key; configuring an existing id replaces the policy
    pub id: String,

    /// Display name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Days an entry stays in the live store
    pub retention_days: u32,

    /// Compliance types this policy covers
    #[serde(default)]
    pub applicable_compliance_types: Vec<ComplianceType>,

    /// Event types this policy covers
    #[serde(default)]
    pub applicable_event_types: Vec<AuditEventType>,

    /// Move expired entries to the archive instead of deleting them
    #[serde(default)]
    pub archive_before_deletion: bool,

    /// Days archived entries are kept
    #[serde(default)]
    pub archive_retention_days: u32,
}

/// How a policy matched an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PolicyMatch {
    /// Event type listed explicitly
    EventType,
    /// Compliance type listed
    ComplianceType,
}

impl RetentionPolicy {
    /// Create policy with no match criteria
    pub fn new(id: impl Into<String>, name: impl Into<String>, retention_days: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            retention_days,
            applicable_compliance_types: Vec::new(),
            applicable_event_types: Vec::new(),
            archive_before_deletion: false,
            archive_retention_days: 0,
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Cover the given compliance types
    pub fn for_compliance_types(mut self, types: impl IntoIterator<Item = ComplianceType>) -> Self {
        self.applicable_compliance_types.extend(types);
        self
    }

    /// Cover the given event types
    pub fn for_event_types(mut self, types: impl IntoIterator<Item = AuditEventType>) -> Self {
        self.applicable_event_types.extend(types);
        self
    }

    /// Archive expired entries and keep the archive for `days`
    pub fn archive_for(mut self, days: u32) -> Self {
        self.archive_before_deletion = true;
        self.archive_retention_days = days;
        self
    }

    /// General-purpose operational records (1 year)
    pub fn general() -> Self {
        Self::new(GENERAL_POLICY_ID, "General", 365)
            .with_description("Default retention for operational audit records")
            .for_compliance_types([ComplianceType::General])
    }

    /// HIPAA records (6 years)
    pub fn hipaa() -> Self {
        Self::new("hipaa", "HIPAA", 2190)
            .with_description("HIPAA requires audit documentation be kept for six years")
            .for_compliance_types([ComplianceType::Hipaa])
            .archive_for(2190)
    }

    /// GDPR records (1 year)
    pub fn gdpr() -> Self {
        Self::new("gdpr", "GDPR", 365)
            .with_description("GDPR storage limitation: keep personal data no longer than needed")
            .for_compliance_types([ComplianceType::Gdpr])
    }

    /// Security incidents (3 years, archived 7)
    pub fn security() -> Self {
        Self::new("security", "Security", 1095)
            .with_description("Security incidents and failed authentication")
            .for_event_types([
                AuditEventType::SecurityEvent,
                AuditEventType::AuthenticationFailed,
            ])
            .archive_for(2555)
    }

    /// SOC 2 records (7 years, archived 10)
    pub fn soc2() -> Self {
        Self::new("soc2", "SOC 2", 2555)
            .with_description("SOC 2 audit evidence retention")
            .for_compliance_types([ComplianceType::Soc2])
            .archive_for(3650)
    }

    /// Built-in policy set
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::general(),
            Self::hipaa(),
            Self::gdpr(),
            Self::security(),
            Self::soc2(),
        ]
    }

    /// Check whether this policy applies to an entry
    pub fn applies_to(
        &self,
        event_type: AuditEventType,
        compliance_type: ComplianceType,
    ) -> Option<PolicyMatch> {
        if self.applicable_event_types.contains(&event_type) {
            Some(PolicyMatch::EventType)
        } else if self.applicable_compliance_types.contains(&compliance_type) {
            Some(PolicyMatch::ComplianceType)
        } else {
            None
        }
    }

    /// Expiry for an entry appended at `timestamp`
    pub fn expiry_from(&self, timestamp: Timestamp) -> Timestamp {
        timestamp.add_days(self.retention_days)
    }

    /// Validate policy fields
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.id.trim().is_empty() {
            return Err(PolicyError::MissingField {
                field: "id".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(PolicyError::MissingField {
                field: "name".to_string(),
            });
        }
        if self.archive_before_deletion && self.archive_retention_days == 0 {
            return Err(PolicyError::InvalidArchiveRetention {
                policy_id: self.id.clone(),
            });
        }
        for days in [self.retention_days, self.archive_retention_days] {
            if days > MAX_RETENTION_DAYS {
                return Err(PolicyError::RetentionTooLong {
                    policy_id: self.id.clone(),
                    days,
                });
            }
        }
        Ok(())
    }
}

/// Errors raised when configuring policies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Retention policy field '{field}' is required")]
    MissingField { field: String },

    #[error("Retention policy '{policy_id}' archives entries but keeps the archive for 0 days")]
    InvalidArchiveRetention { policy_id: String },

    #[error(
        "Retention policy '{policy_id}' asks for {days} days (limit {max})",
        max = MAX_RETENTION_DAYS
    )]
    RetentionTooLong { policy_id: String, days: u32 },
}

/// Mutable table of retention policies
///
/// Policies are added or replaced through [`configure`](Self::configure) and
/// are never removed.
#[derive(Debug)]
pub struct RetentionPolicyEngine {
    policies: RwLock<HashMap<String, RetentionPolicy>>,
    default_retention_days: u32,
}

impl RetentionPolicyEngine {
    /// Create engine seeded with the built-in defaults
    ///
    /// `default_retention_days` is capped at [`MAX_RETENTION_DAYS`].
    pub fn new(default_retention_days: u32) -> Self {
        let policies = RetentionPolicy::defaults()
            .into_iter()
            .map(|policy| (policy.id.clone(), policy))
            .collect();

        Self {
            policies: RwLock::new(policies),
            default_retention_days: default_retention_days.min(MAX_RETENTION_DAYS),
        }
    }

    /// Add a policy, or replace the one with the same id
    pub fn configure(&self, policy: RetentionPolicy) -> Result<(), PolicyError> {
        policy.validate()?;

        let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = policies.insert(policy.id.clone(), policy.clone()).is_some();

        info!(
            policy_id = %policy.id,
            retention_days = policy.retention_days,
            replaced,
            "Retention policy configured"
        );
        Ok(())
    }

    /// Get policy by id
    pub fn get(&self, id: &str) -> Option<RetentionPolicy> {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// All policies, sorted by id
    pub fn list(&self) -> Vec<RetentionPolicy> {
        let mut policies: Vec<RetentionPolicy> = self
            .policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        policies
    }

    /// Longest archive window among policies that archive, if any do
    pub fn longest_archive_retention(&self) -> Option<u32> {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|policy| policy.archive_before_deletion)
            .map(|policy| policy.archive_retention_days)
            .max()
    }

    /// Policy governing an entry
    pub fn resolve(
        &self,
        event_type: AuditEventType,
        compliance_type: ComplianceType,
    ) -> RetentionPolicy {
        let policies = self.policies.read().unwrap_or_else(PoisonError::into_inner);

        let best = policies
            .values()
            .filter_map(|policy| {
                policy
                    .applies_to(event_type, compliance_type)
                    .map(|kind| (kind, policy))
            })
            .min_by(|(kind_a, a), (kind_b, b)| {
                kind_a
                    .cmp(kind_b)
                    .then(a.retention_days.cmp(&b.retention_days))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|(_, policy)| policy.clone());

        best.or_else(|| policies.get(GENERAL_POLICY_ID).cloned())
            .unwrap_or_else(|| {
                RetentionPolicy::new(GENERAL_POLICY_ID, "Default", self.default_retention_days)
            })
    }

    /// Expiry for an entry appended at `timestamp`
    pub fn resolve_expiry(
        &self,
        event_type: AuditEventType,
        compliance_type: ComplianceType,
        timestamp: Timestamp,
    ) -> Timestamp {
        self.resolve(event_type, compliance_type)
            .expiry_from(timestamp)
    }
}

impl Default for RetentionPolicyEngine {
    fn default() -> Self {
        Self::new(365)
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
