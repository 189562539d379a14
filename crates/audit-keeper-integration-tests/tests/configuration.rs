//! Integration tests for file-based ledger configuration
//!
//! These tests load a configuration file through the public loader and
//! check that the opened ledger honours it.

use audit_keeper_core::{
    AuditEventType, AuditLedger, ComplianceType, ConfigError, LedgerConfig, LogQuery, Rollover,
    Sensitivity,
};
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("Failed to write config file");
    path
}

#[tokio::test]
async fn test_yaml_configuration_drives_the_ledger() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("ledger");
    let path = write_config(
        &dir,
        "audit.yaml",
        &format!(
            r#"
log_directory: {}
rollover: monthly
policies:
  - id: gdpr
    name: GDPR
    retention_days: 30
    applicable_compliance_types: [GDPR]
classifier_overrides:
  - event_type: 12
    compliance_type: GDPR
"#,
            log_dir.display()
        ),
    );

    let config = LedgerConfig::load(Some(&path)).unwrap();
    assert_eq!(config.rollover, Rollover::Monthly);

    let ledger = AuditLedger::open(&config).await.unwrap();
    let entry = ledger
        .append(AuditEventType::DataAccessed, "profile viewed", None, Sensitivity::Low)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entry.compliance_type, ComplianceType::Gdpr);
    assert_eq!(entry.retention_expiry, entry.timestamp.add_days(30));
    assert_eq!(ledger.policies().get("gdpr").unwrap().retention_days, 30);

    let store = log_dir.join(Rollover::Monthly.store_file_name(entry.timestamp));
    assert!(store.is_file(), "expected monthly store {}", store.display());
    assert_eq!(ledger.get_logs(&LogQuery::new()).await.len(), 1);
}

#[tokio::test]
async fn test_toml_configuration_can_start_disabled() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("ledger");
    let path = write_config(
        &dir,
        "audit.toml",
        &format!(
            "log_directory = {:?}\nenabled = false\n",
            log_dir.display().to_string()
        ),
    );

    let config = LedgerConfig::load(Some(&path)).unwrap();
    let ledger = AuditLedger::open(&config).await.unwrap();

    assert!(!ledger.is_enabled());
    let skipped = ledger
        .append(AuditEventType::UserLogin, "ignored", None, Sensitivity::Low)
        .await
        .unwrap();
    assert!(skipped.is_none());
}

#[test]
fn test_missing_configuration_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = LedgerConfig::load(Some(&dir.path().join("absent.yaml")));

    assert!(matches!(result, Err(ConfigError::Load { .. })));
}

#[test]
fn test_invalid_policy_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "audit.yaml",
        r#"
policies:
  - id: broken
    name: Broken
    retention_days: 10
    archive_before_deletion: true
    archive_retention_days: 0
"#,
    );

    let result = LedgerConfig::load(Some(&path));

    assert!(matches!(result, Err(ConfigError::InvalidPolicy(_))));
}
