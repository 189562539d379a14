//! # Query, Statistics, Export and Verification
//!
//! Read paths over the live stores. Reads take no store lock; atomic writes
//! guarantee each store is observed either before or after an append.
//! Unreadable stores are logged and skipped so one corrupt file never hides
//! entries held in the others.

use crate::entry::{AuditEntry, AuditEventType, ComplianceType};
use crate::ledger::{AuditLedger, LedgerError, RemovalRecord};
use crate::{AuditEntryId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Export document format version
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

// ============================================================================
// Query
// ============================================================================

/// Filter for [`AuditLedger::get_logs`]
///
/// All set criteria must match. Time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub event_type: Option<AuditEventType>,
    pub compliance_type: Option<ComplianceType>,
}

impl LogQuery {
    /// Query matching every entry
    pub fn new() -> Self {
        Self::default()
    }

    /// Only entries at or after `start`
    pub fn since(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }

    /// Only entries at or before `end`
    pub fn until(mut self, end: Timestamp) -> Self {
        self.end = Some(end);
        self
    }

    /// Only entries of `event_type`
    pub fn with_event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Only entries classified as `compliance_type`
    pub fn with_compliance_type(mut self, compliance_type: ComplianceType) -> Self {
        self.compliance_type = Some(compliance_type);
        self
    }

    /// Check if an entry satisfies every criterion
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.start.map_or(true, |start| entry.timestamp >= start)
            && self.end.map_or(true, |end| entry.timestamp <= end)
            && self.event_type.map_or(true, |t| entry.event_type == t)
            && self.compliance_type.map_or(true, |c| entry.compliance_type == c)
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Summary of the live stores
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditStatistics {
    pub total_entries: usize,

    /// Entry count per event type name
    pub entries_by_type: BTreeMap<String, usize>,

    /// Entry count per compliance type name
    pub entries_by_compliance: BTreeMap<String, usize>,

    pub oldest_entry: Option<Timestamp>,
    pub newest_entry: Option<Timestamp>,
}

/// Header of an export document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportMetadata {
    pub exported_at: Timestamp,
    pub total_entries: usize,

    /// Hashed identity of the exporting actor
    pub exported_by: String,

    pub format_version: String,
}

/// Self-describing export file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportDocument {
    pub export_metadata: ExportMetadata,
    pub entries: Vec<AuditEntry>,
}

/// Outcome of walking every live store chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChainVerificationResult {
    pub stores_checked: usize,
    pub entries_checked: usize,

    /// Entries whose digest and link both check out
    pub verified: usize,

    /// Entries whose stored digest does not match their fields
    pub tampered: Vec<AuditEntryId>,

    /// Entries not linked to their surviving predecessor
    pub broken_links: Vec<AuditEntryId>,

    /// Links whose predecessor was removed by a retention sweep or archival
    pub retention_gaps: usize,

    /// Stores that could not be read
    pub unreadable_stores: Vec<String>,
}

impl ChainVerificationResult {
    /// Check if no tampering, broken link or unreadable store was found
    pub fn is_intact(&self) -> bool {
        self.tampered.is_empty()
            && self.broken_links.is_empty()
            && self.unreadable_stores.is_empty()
    }
}

// ============================================================================
// Chain Links
// ============================================================================

/// Relation between an entry and the entry before it in the same store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    /// First entry of the store
    Head,
    /// Linked to the predecessor
    Intact,
    /// Linked to the predecessor through entries a sweep removed
    Gap,
    Broken,
}

fn link_at(entries: &[AuditEntry], index: usize, removed: &RemovalRecord) -> Link {
    let entry = &entries[index];
    let previous = index.checked_sub(1).and_then(|i| entries.get(i));

    let expected = match previous {
        Some(previous) if entry.follows(previous) => return Link::Intact,
        Some(previous) => previous.integrity_hash.as_str(),
        None if entry.previous_hash.is_empty() => return Link::Head,
        None => "",
    };

    if bridges_removed(&entry.previous_hash, expected, removed) {
        Link::Gap
    } else {
        Link::Broken
    }
}

/// Walk back from `hash` through removed entries looking for `target`
fn bridges_removed(hash: &str, target: &str, removed: &RemovalRecord) -> bool {
    let mut current = hash;
    for _ in 0..removed.len() {
        match removed.get(current) {
            Some(linked) if linked == target => return true,
            Some(linked) => current = linked,
            None => return false,
        }
    }
    false
}

// ============================================================================
// Ledger Read Operations
// ============================================================================

impl AuditLedger {
    /// Entries matching `query`, oldest first
    pub async fn get_logs(&self, query: &LogQuery) -> Vec<AuditEntry> {
        let mut results: Vec<AuditEntry> = self
            .readable_stores()
            .await
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .filter(|entry| query.matches(entry))
            .collect();

        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        results
    }

    /// Find a live entry by id
    pub async fn get_entry(&self, id: &AuditEntryId) -> Option<AuditEntry> {
        self.readable_stores()
            .await
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .find(|entry| entry.id == *id)
    }

    /// Counts and time range of the live entries
    pub async fn get_statistics(&self) -> AuditStatistics {
        let mut stats = AuditStatistics::default();

        for (_, entries) in self.readable_stores().await {
            for entry in entries {
                stats.total_entries += 1;
                *stats
                    .entries_by_type
                    .entry(entry.event_type.to_string())
                    .or_default() += 1;
                *stats
                    .entries_by_compliance
                    .entry(entry.compliance_type.to_string())
                    .or_default() += 1;

                stats.oldest_entry = Some(match stats.oldest_entry {
                    Some(oldest) => oldest.min(entry.timestamp),
                    None => entry.timestamp,
                });
                stats.newest_entry = Some(match stats.newest_entry {
                    Some(newest) => newest.max(entry.timestamp),
                    None => entry.timestamp,
                });
            }
        }

        stats
    }

    /// Export every live entry
    ///
    /// Without `path` the file is written to
    /// `<export dir>/audit-export-YYYYMMDD-HHMMSS.json`. Returns the written
    /// location.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the file cannot be written.
    pub async fn export_logs(&self, path: Option<&Path>) -> Result<PathBuf, LedgerError> {
        self.export_matching(&LogQuery::default(), path).await
    }

    /// Export live entries matching `query`
    pub async fn export_matching(
        &self,
        query: &LogQuery,
        path: Option<&Path>,
    ) -> Result<PathBuf, LedgerError> {
        let now = self.clock.now();
        let entries = self.get_logs(query).await;

        let document = ExportDocument {
            export_metadata: ExportMetadata {
                exported_at: now,
                total_entries: entries.len(),
                exported_by: self.identity.actor_id(),
                format_version: EXPORT_FORMAT_VERSION.to_string(),
            },
            entries,
        };

        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self
                .export_dir
                .join(now.format("audit-export-%Y%m%d-%H%M%S.json")),
        };

        let contents =
            serde_json::to_string_pretty(&document).map_err(|e| LedgerError::Serialization {
                message: e.to_string(),
            })?;
        self.storage.write_atomic(&target, &contents).await?;

        let written = self.storage.resolve(&target);
        info!(
            path = %written.display(),
            total_entries = document.export_metadata.total_entries,
            "Audit log exported"
        );
        Ok(written)
    }

    /// Check that an entry has not been altered
    ///
    /// Recomputes the entry's digest and checks its link to the entry
    /// before it in the same store. A link may skip entries only when the
    /// store's removal record accounts for every one of them. Archived
    /// entries are checked by digest only. Returns `false` for unknown ids.
    pub async fn verify_integrity(&self, id: &AuditEntryId) -> bool {
        for (store, entries) in self.readable_stores().await {
            if let Some(index) = entries.iter().position(|e| e.id == *id) {
                let removed = self.removal_record_or_empty(&store).await;
                return entries[index].verify_digest()
                    && link_at(&entries, index, &removed) != Link::Broken;
            }
        }

        self.list_archived_logs()
            .await
            .iter()
            .find(|e| e.id == *id)
            .is_some_and(AuditEntry::verify_digest)
    }

    /// Verify every live store chain
    pub async fn verify_chain(&self) -> ChainVerificationResult {
        let mut result = ChainVerificationResult::default();

        let stores = match self.live_store_paths().await {
            Ok(stores) => stores,
            Err(e) => {
                warn!(error = %e, "Cannot list live stores");
                return result;
            }
        };

        for store in stores {
            let entries = match self.read_store(&store).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        store = %store.display(),
                        error = %e,
                        "Unreadable store during chain verification"
                    );
                    result.unreadable_stores.push(store.display().to_string());
                    continue;
                }
            };

            result.stores_checked += 1;
            let removed = self.removal_record_or_empty(&store).await;

            for (index, entry) in entries.iter().enumerate() {
                result.entries_checked += 1;

                let digest_ok = entry.verify_digest();
                let link = link_at(&entries, index, &removed);

                if !digest_ok {
                    result.tampered.push(entry.id);
                }
                match link {
                    Link::Broken => result.broken_links.push(entry.id),
                    Link::Gap => result.retention_gaps += 1,
                    Link::Head | Link::Intact => {}
                }
                if digest_ok && link != Link::Broken {
                    result.verified += 1;
                }
            }
        }

        info!(
            entries_checked = result.entries_checked,
            tampered = result.tampered.len(),
            broken_links = result.broken_links.len(),
            "Chain verification completed"
        );
        result
    }

    /// Removal record of `store`; an unreadable record bridges nothing
    async fn removal_record_or_empty(&self, store: &Path) -> RemovalRecord {
        self.read_removal_record(store).await.unwrap_or_else(|e| {
            warn!(store = %store.display(), error = %e, "Unreadable removal record");
            RemovalRecord::new()
        })
    }

    /// Parsed contents of every readable live store
    async fn readable_stores(&self) -> Vec<(PathBuf, Vec<AuditEntry>)> {
        let stores = match self.live_store_paths().await {
            Ok(stores) => stores,
            Err(e) => {
                warn!(error = %e, "Cannot list live stores");
                return Vec::new();
            }
        };

        let mut readable = Vec::with_capacity(stores.len());
        for store in stores {
            match self.read_store(&store).await {
                Ok(entries) => readable.push((store, entries)),
                Err(e) => warn!(store = %store.display(), error = %e, "Skipping unreadable store"),
            }
        }
        readable
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
