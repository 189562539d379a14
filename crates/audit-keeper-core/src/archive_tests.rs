//! Tests for retention sweeps, archival and purge.

use super::*;
use crate::adapters::InMemoryLedgerStorage;
use crate::entry::{AuditEventType, ComplianceType, Sensitivity};
use crate::identity::FixedClock;
use crate::ledger::removal_record_path;
use crate::retention::RetentionPolicy;
use crate::storage::LedgerStorage;
use std::sync::Arc;

fn start() -> Timestamp {
    Timestamp::from_rfc3339("2024-01-10T08:00:00Z").unwrap()
}

fn test_ledger() -> (AuditLedger, InMemoryLedgerStorage, Arc<FixedClock>) {
    let storage = InMemoryLedgerStorage::new();
    let clock = Arc::new(FixedClock::new(start()));
    let ledger = AuditLedger::builder(Arc::new(storage.clone()))
        .with_clock(clock.clone())
        .build()
        .unwrap();
    (ledger, storage, clock)
}

async fn append(
    ledger: &AuditLedger,
    event_type: AuditEventType,
    sensitivity: Sensitivity,
) -> AuditEntry {
    ledger
        .append(event_type, "test event", None, sensitivity)
        .await
        .unwrap()
        .unwrap()
}

async fn live_entries(ledger: &AuditLedger) -> Vec<AuditEntry> {
    let mut all = Vec::new();
    for store in ledger.live_store_paths().await.unwrap() {
        all.extend(ledger.read_store(&store).await.unwrap());
    }
    all
}

// ============================================================================
// Retention Sweep Tests
// ============================================================================

#[tokio::test]
async fn test_retention_deletes_or_archives_expired_entries() {
    let (ledger, _storage, clock) = test_ledger();

    let general = append(&ledger, AuditEventType::TextInjected, Sensitivity::Low).await;
    let hipaa = append(&ledger, AuditEventType::TextInjected, Sensitivity::High).await;
    let soc2 = append(&ledger, AuditEventType::ApiKeyAccessed, Sensitivity::Low).await;
    assert_eq!(general.compliance_type, ComplianceType::General);
    assert_eq!(hipaa.compliance_type, ComplianceType::Hipaa);
    assert_eq!(soc2.compliance_type, ComplianceType::Soc2);

    // Past the general (365) and HIPAA (2190) windows, inside SOC 2 (2555)
    clock.advance_days(2200);
    let removed = ledger.apply_retention_policies().await;

    assert_eq!(removed, 2);

    let live: Vec<AuditEntryId> = live_entries(&ledger).await.iter().map(|e| e.id).collect();
    assert_eq!(live, vec![soc2.id]);

    // General policy deletes outright; HIPAA archives first
    let archived: Vec<AuditEntryId> =
        ledger.list_archived_logs().await.iter().map(|e| e.id).collect();
    assert_eq!(archived, vec![hipaa.id]);
}

#[tokio::test]
async fn test_retention_with_nothing_expired() {
    let (ledger, _storage, clock) = test_ledger();
    append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;

    clock.advance_days(10);

    assert_eq!(ledger.apply_retention_policies().await, 0);
    assert_eq!(live_entries(&ledger).await.len(), 1);
}

#[tokio::test]
async fn test_retention_uses_policy_in_force_at_sweep_time() {
    let (ledger, _storage, clock) = test_ledger();
    let entry = append(&ledger, AuditEventType::TextInjected, Sensitivity::Low).await;

    ledger
        .configure_policy(RetentionPolicy::general().archive_for(30))
        .unwrap();
    clock.advance_days(366);

    assert_eq!(ledger.apply_retention_policies().await, 1);
    let archived = ledger.list_archived_logs().await;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, entry.id);
}

#[tokio::test]
async fn test_retention_skips_corrupt_store() {
    let (ledger, storage, clock) = test_ledger();
    storage
        .write_atomic(Path::new("audit-2023-12-31.json"), "this is not json")
        .await
        .unwrap();
    append(&ledger, AuditEventType::TextInjected, Sensitivity::Low).await;

    clock.advance_days(400);

    assert_eq!(ledger.apply_retention_policies().await, 1);
    assert_eq!(
        storage
            .read_to_string(Path::new("audit-2023-12-31.json"))
            .await
            .unwrap(),
        "this is not json"
    );
}

#[tokio::test]
async fn test_retention_keeps_entries_when_archive_write_fails() {
    let (ledger, storage, clock) = test_ledger();
    let entry = append(&ledger, AuditEventType::ApiKeyAccessed, Sensitivity::Low).await;

    clock.advance_days(2556);
    let archive_path = ledger.archive_path_for(ledger.now());
    storage.write_atomic(&archive_path, "[ broken").await.unwrap();

    assert_eq!(ledger.apply_retention_policies().await, 0);
    let live: Vec<AuditEntryId> = live_entries(&ledger).await.iter().map(|e| e.id).collect();
    assert_eq!(live, vec![entry.id]);
}

#[tokio::test]
async fn test_append_after_sweep_chains_to_new_tail() {
    let (ledger, _storage, clock) = test_ledger();
    let kept = append(&ledger, AuditEventType::ApiKeyAccessed, Sensitivity::Low).await;
    append(&ledger, AuditEventType::TextInjected, Sensitivity::Low).await;

    clock.advance_days(400);
    assert_eq!(ledger.apply_retention_policies().await, 1);

    // Same store as the survivors
    clock.set(start());
    let next = append(&ledger, AuditEventType::UserLogout, Sensitivity::Low).await;

    assert_eq!(next.previous_hash, kept.integrity_hash);
}

// ============================================================================
// Archival Tests
// ============================================================================

#[tokio::test]
async fn test_archive_everything_with_zero_days() {
    let (ledger, storage, _clock) = test_ledger();
    let first = append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;
    let second = append(&ledger, AuditEventType::DataAccessed, Sensitivity::High).await;

    let moved = ledger.archive_old_logs(0).await;

    assert_eq!(moved, 2);
    assert!(live_entries(&ledger).await.is_empty());
    assert!(!storage.exists(Path::new("audit-2024-01-10.json")).await);
    assert!(storage
        .exists(Path::new("archive/audit-archive-2024-01-10.json"))
        .await);

    let archived: Vec<AuditEntryId> =
        ledger.list_archived_logs().await.iter().map(|e| e.id).collect();
    assert_eq!(archived, vec![first.id, second.id]);
}

#[tokio::test]
async fn test_archive_by_entry_age() {
    let (ledger, _storage, clock) = test_ledger();
    let old = append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;
    clock.advance_days(40);
    let recent = append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;

    assert_eq!(ledger.archive_old_logs(30).await, 1);

    let live: Vec<AuditEntryId> = live_entries(&ledger).await.iter().map(|e| e.id).collect();
    assert_eq!(live, vec![recent.id]);
    assert_eq!(ledger.list_archived_logs().await[0].id, old.id);
}

#[tokio::test]
async fn test_archived_entries_keep_valid_digests() {
    let (ledger, _storage, _clock) = test_ledger();
    append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;
    append(&ledger, AuditEventType::UserLogout, Sensitivity::Low).await;

    ledger.archive_old_logs(0).await;

    let archived = ledger.list_archived_logs().await;
    assert_eq!(archived.len(), 2);
    assert!(archived.iter().all(AuditEntry::verify_digest));
    assert!(archived[1].follows(&archived[0]));
}

#[tokio::test]
async fn test_archive_does_not_duplicate_entries() {
    let (ledger, _storage, _clock) = test_ledger();
    let entry = append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;

    ledger
        .append_to_archive(std::slice::from_ref(&entry), ledger.now())
        .await
        .unwrap();
    ledger
        .append_to_archive(std::slice::from_ref(&entry), ledger.now())
        .await
        .unwrap();

    assert_eq!(ledger.list_archived_logs().await.len(), 1);
}

#[tokio::test]
async fn test_remove_confirmed_ignores_missing_ids() {
    let (ledger, _storage, _clock) = test_ledger();
    append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;
    let store = ledger.store_path_for(start());

    let ghost: HashSet<AuditEntryId> = [AuditEntryId::new()].into_iter().collect();
    assert_eq!(ledger.remove_confirmed(&store, &ghost).await.unwrap(), 0);
    assert_eq!(ledger.read_store(&store).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_partial_removal_is_recorded() {
    let (ledger, storage, clock) = test_ledger();
    let kept = append(&ledger, AuditEventType::ApiKeyAccessed, Sensitivity::Low).await;
    let expired = append(&ledger, AuditEventType::TextInjected, Sensitivity::Low).await;
    let store = ledger.store_path_for(start());

    clock.advance_days(400);
    assert_eq!(ledger.apply_retention_policies().await, 1);

    let record = ledger.read_removal_record(&store).await.unwrap();
    assert_eq!(record.len(), 1);
    assert_eq!(record.get(&expired.integrity_hash), Some(&kept.integrity_hash));
    assert!(storage.exists(&removal_record_path(&store)).await);

    // Emptying the store drops the record with it
    assert_eq!(ledger.archive_old_logs(0).await, 1);
    assert!(!storage.exists(&store).await);
    assert!(!storage.exists(&removal_record_path(&store)).await);
}

#[tokio::test]
async fn test_removal_record_is_not_a_live_store() {
    let (ledger, _storage, clock) = test_ledger();
    append(&ledger, AuditEventType::ApiKeyAccessed, Sensitivity::Low).await;
    append(&ledger, AuditEventType::TextInjected, Sensitivity::Low).await;

    clock.advance_days(400);
    ledger.apply_retention_policies().await;

    let stores = ledger.live_store_paths().await.unwrap();
    assert_eq!(stores, vec![ledger.store_path_for(start())]);
}

#[tokio::test]
async fn test_deleted_files_release_their_locks() {
    let (ledger, storage, _clock) = test_ledger();
    append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;
    assert_eq!(ledger.locks.len(), 1);

    // Live store emptied and deleted; only the archive file keeps a lock
    assert_eq!(ledger.archive_old_logs(0).await, 1);
    assert_eq!(ledger.locks.len(), 1);

    let archive = Path::new("archive/audit-archive-2024-01-10.json");
    assert!(storage.set_modified(archive, start().subtract_days(45)));
    assert_eq!(ledger.purge_archived_logs(30).await, 1);
    assert_eq!(ledger.locks.len(), 0);
}

#[tokio::test]
async fn test_held_lock_survives_release() {
    let (ledger, _storage, _clock) = test_ledger();
    let path = Path::new("audit-2024-01-10.json");

    let held = ledger.locks.for_store(path);
    ledger.locks.release(path);
    assert_eq!(ledger.locks.len(), 1);

    drop(held);
    ledger.locks.release(path);
    assert_eq!(ledger.locks.len(), 0);
}

#[tokio::test]
async fn test_extreme_day_thresholds_do_not_panic() {
    let (ledger, storage, _clock) = test_ledger();
    append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;

    assert_eq!(ledger.archive_old_logs(u32::MAX).await, 0);
    assert_eq!(live_entries(&ledger).await.len(), 1);

    ledger.archive_old_logs(0).await;
    assert_eq!(ledger.purge_archived_logs(u32::MAX).await, 0);
    assert!(storage
        .exists(Path::new("archive/audit-archive-2024-01-10.json"))
        .await);
}

// ============================================================================
// Purge Tests
// ============================================================================

#[tokio::test]
async fn test_purge_deletes_old_archive_files() {
    let (ledger, storage, _clock) = test_ledger();
    append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;
    ledger.archive_old_logs(0).await;

    let old_file = Path::new("archive/audit-archive-2024-01-10.json");
    let recent_file = Path::new("archive/audit-archive-2024-01-09.json");
    storage.write_atomic(recent_file, "[]").await.unwrap();
    assert!(storage.set_modified(old_file, start().subtract_days(45)));
    assert!(storage.set_modified(recent_file, start().subtract_days(1)));

    let purged = ledger.purge_archived_logs(30).await;

    assert_eq!(purged, 1);
    assert!(!storage.exists(old_file).await);
    assert!(storage.exists(recent_file).await);
}

#[tokio::test]
async fn test_purge_by_policy_uses_longest_archive_window() {
    let (ledger, storage, _clock) = test_ledger();
    append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;
    ledger.archive_old_logs(0).await;
    let archive = Path::new("archive/audit-archive-2024-01-10.json");

    // Past the HIPAA window but inside SOC 2 archiving
    assert!(storage.set_modified(archive, start().subtract_days(3000)));
    assert_eq!(ledger.purge_expired_archives().await, 0);
    assert!(storage.exists(archive).await);

    assert!(storage.set_modified(archive, start().subtract_days(3651)));
    assert_eq!(ledger.purge_expired_archives().await, 1);
    assert!(!storage.exists(archive).await);
}

#[tokio::test]
async fn test_purge_without_archive_directory() {
    let (ledger, _storage, _clock) = test_ledger();
    assert_eq!(ledger.purge_archived_logs(0).await, 0);
}

#[tokio::test]
async fn test_purge_ignores_foreign_files() {
    let (ledger, storage, _clock) = test_ledger();
    let notes = Path::new("archive/README.txt");
    storage.write_atomic(notes, "keep me").await.unwrap();
    storage.set_modified(notes, start().subtract_days(1000));

    assert_eq!(ledger.purge_archived_logs(30).await, 0);
    assert!(storage.exists(notes).await);
}

#[tokio::test]
async fn test_list_archived_skips_corrupt_files() {
    let (ledger, storage, _clock) = test_ledger();
    let entry = append(&ledger, AuditEventType::UserLogin, Sensitivity::Low).await;
    ledger.archive_old_logs(0).await;
    storage
        .write_atomic(Path::new("archive/audit-archive-2023-01-01.json"), "garbage")
        .await
        .unwrap();

    let archived = ledger.list_archived_logs().await;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, entry.id);
}
