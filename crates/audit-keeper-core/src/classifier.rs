//! # Compliance Classifier
//!
//! Maps an event type and sensitivity to the compliance category that later
//! selects a retention policy.
//!
//! Classification is two-tier:
//! 1. Event types registered as overrides classify to their registered
//!    category regardless of sensitivity (security and access events are SOC 2
//!    by default).
//! 2. Every other registered event type follows its sensitivity: Public, Low
//!    and Medium are General; High and Critical are HIPAA.
//!
//! Unregistered event codes are always General.

use crate::entry::{AuditEventType, ComplianceType, Sensitivity};
use std::collections::HashMap;

/// Event types that are inherently security or operational events
const SOC2_EVENT_TYPES: [AuditEventType; 4] = [
    AuditEventType::SecurityEvent,
    AuditEventType::ApiKeyAccessed,
    AuditEventType::UserLogin,
    AuditEventType::UserLogout,
];

/// Deterministic event classifier
#[derive(Debug, Clone)]
pub struct ComplianceClassifier {
    overrides: HashMap<AuditEventType, ComplianceType>,
}

impl ComplianceClassifier {
    /// Create classifier with the built-in SOC 2 overrides
    pub fn new() -> Self {
        let overrides = SOC2_EVENT_TYPES
            .iter()
            .map(|event_type| (*event_type, ComplianceType::Soc2))
            .collect();
        Self { overrides }
    }

    /// Register an additional override, builder style
    pub fn with_override(mut self, event_type: AuditEventType, compliance: ComplianceType) -> Self {
        self.register(event_type, compliance);
        self
    }

    /// Register an additional override
    pub fn register(&mut self, event_type: AuditEventType, compliance: ComplianceType) {
        self.overrides.insert(event_type, compliance);
    }

    /// Category an override pins this event type to, if any
    pub fn override_for(&self, event_type: AuditEventType) -> Option<ComplianceType> {
        self.overrides.get(&event_type).copied()
    }

    /// Classify an event
    pub fn classify(&self, event_type: AuditEventType, sensitivity: Sensitivity) -> ComplianceType {
        if let Some(compliance) = self.override_for(event_type) {
            return compliance;
        }

        if !event_type.is_known() {
            return ComplianceType::General;
        }

        match sensitivity {
            Sensitivity::Public | Sensitivity::Low | Sensitivity::Medium => ComplianceType::General,
            Sensitivity::High | Sensitivity::Critical => ComplianceType::Hipaa,
        }
    }
}

impl Default for ComplianceClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
