//! Tests for the retention policy engine.

use super::*;

#[test]
fn test_default_policies_are_present() {
    let engine = RetentionPolicyEngine::default();
    let ids: Vec<String> = engine.list().into_iter().map(|p| p.id).collect();

    assert_eq!(ids, vec!["gdpr", "general", "hipaa", "security", "soc2"]);

    let hipaa = engine.get("hipaa").unwrap();
    assert_eq!(hipaa.retention_days, 2190);

    let gdpr = engine.get("gdpr").unwrap();
    assert_eq!(gdpr.retention_days, 365);

    let soc2 = engine.get("soc2").unwrap();
    assert_eq!(soc2.retention_days, 2555);
    assert!(soc2.archive_before_deletion);
    assert_eq!(soc2.archive_retention_days, 3650);
}

#[test]
fn test_resolve_by_compliance_type() {
    let engine = RetentionPolicyEngine::default();

    let policy = engine.resolve(AuditEventType::ApiKeyAccessed, ComplianceType::Soc2);
    assert_eq!(policy.id, "soc2");

    let policy = engine.resolve(AuditEventType::TextInjected, ComplianceType::Hipaa);
    assert_eq!(policy.id, "hipaa");

    let policy = engine.resolve(AuditEventType::TextInjected, ComplianceType::General);
    assert_eq!(policy.id, "general");
}

#[test]
fn test_event_type_match_beats_compliance_match() {
    let engine = RetentionPolicyEngine::default();

    // SecurityEvent classifies as SOC2 but the security policy names it directly
    let policy = engine.resolve(AuditEventType::SecurityEvent, ComplianceType::Soc2);
    assert_eq!(policy.id, "security");
}

#[test]
fn test_shortest_retention_breaks_ties() {
    let engine = RetentionPolicyEngine::default();
    engine
        .configure(
            RetentionPolicy::new("short-general", "Short general", 30)
                .for_compliance_types([ComplianceType::General]),
        )
        .unwrap();

    let policy = engine.resolve(AuditEventType::TextInjected, ComplianceType::General);
    assert_eq!(policy.id, "short-general");
}

#[test]
fn test_id_breaks_remaining_ties() {
    let engine = RetentionPolicyEngine::default();
    for id in ["zeta", "alpha"] {
        engine
            .configure(
                RetentionPolicy::new(id, id, 10).for_event_types([AuditEventType::DataDeleted]),
            )
            .unwrap();
    }

    let policy = engine.resolve(AuditEventType::DataDeleted, ComplianceType::General);
    assert_eq!(policy.id, "alpha");
}

#[test]
fn test_configure_updates_existing_policy() {
    let engine = RetentionPolicyEngine::default();
    let mut general = engine.get("general").unwrap();
    general.retention_days = 90;

    engine.configure(general).unwrap();

    assert_eq!(engine.get("general").unwrap().retention_days, 90);
    assert_eq!(engine.list().len(), 5);
}

#[test]
fn test_configure_rejects_invalid_policy() {
    let engine = RetentionPolicyEngine::default();

    let result = engine.configure(RetentionPolicy::new("", "Nameless id", 10));
    assert!(matches!(result, Err(PolicyError::MissingField { .. })));

    let mut broken = RetentionPolicy::new("broken", "Broken", 10);
    broken.archive_before_deletion = true;
    let result = engine.configure(broken);
    assert!(matches!(
        result,
        Err(PolicyError::InvalidArchiveRetention { .. })
    ));
}

#[test]
fn test_configure_rejects_unbounded_retention() {
    let engine = RetentionPolicyEngine::default();

    let result = engine.configure(RetentionPolicy::new("forever", "Forever", 200_000_000));
    assert!(matches!(
        result,
        Err(PolicyError::RetentionTooLong { days: 200_000_000, .. })
    ));

    let long_archive = RetentionPolicy::new("deep", "Deep archive", 30).archive_for(u32::MAX);
    assert!(matches!(
        engine.configure(long_archive),
        Err(PolicyError::RetentionTooLong { .. })
    ));

    let limit = RetentionPolicy::new("century", "Century", MAX_RETENTION_DAYS);
    assert!(engine.configure(limit).is_ok());
    assert!(engine.get("forever").is_none());
}

#[test]
fn test_default_retention_is_capped() {
    let engine = RetentionPolicyEngine::new(u32::MAX);
    assert_eq!(engine.default_retention_days, MAX_RETENTION_DAYS);
}

#[test]
fn test_longest_archive_retention() {
    let engine = RetentionPolicyEngine::default();
    assert_eq!(engine.longest_archive_retention(), Some(3650));

    engine
        .configure(RetentionPolicy::new("legal", "Legal hold", 30).archive_for(5000))
        .unwrap();
    assert_eq!(engine.longest_archive_retention(), Some(5000));

    let engine = RetentionPolicyEngine {
        policies: RwLock::new(HashMap::new()),
        default_retention_days: 17,
    };
    assert_eq!(engine.longest_archive_retention(), None);
}

#[test]
fn test_unmatched_entry_falls_back_to_general() {
    let mut policies = HashMap::new();
    policies.insert(
        GENERAL_POLICY_ID.to_string(),
        RetentionPolicy::new(GENERAL_POLICY_ID, "General", 200),
    );
    let engine = RetentionPolicyEngine {
        policies: RwLock::new(policies),
        default_retention_days: 17,
    };
    let policy = engine.resolve(AuditEventType::Unknown(42), ComplianceType::Gdpr);
    assert_eq!(policy.retention_days, 200);

    let engine = RetentionPolicyEngine {
        policies: RwLock::new(HashMap::new()),
        default_retention_days: 17,
    };
    let policy = engine.resolve(AuditEventType::TextInjected, ComplianceType::General);
    assert_eq!(policy.retention_days, 17);
}

#[test]
fn test_resolve_expiry_adds_policy_days() {
    let engine = RetentionPolicyEngine::default();
    let now = Timestamp::from_rfc3339("2024-01-01T00:00:00Z").unwrap();

    let expiry = engine.resolve_expiry(AuditEventType::ApiKeyAccessed, ComplianceType::Soc2, now);
    assert_eq!(expiry, now.add_days(2555));
}

#[test]
fn test_policy_serializes_event_types_as_codes() {
    let json = serde_json::to_value(RetentionPolicy::security()).unwrap();
    assert_eq!(json["applicable_event_types"], serde_json::json!([15, 11]));
}
