//! # Retention Sweeps, Archival and Purge
//!
//! Batch operations over the live stores. They run alongside appends: each
//! store is read as a snapshot without a lock, the selected entries are
//! archived, and then the store is re-read under its lock and only the
//! selected ids that are still present are removed.
//!
//! Sweeps never fail as a whole. Unreadable stores and failed writes are
//! logged and skipped, and the return value counts what actually happened.

use crate::entry::AuditEntry;
use crate::ledger::{removal_record_path, AuditLedger, LedgerError};
use crate::{AuditEntryId, Timestamp};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Prefix of archive file names
pub(crate) const ARCHIVE_PREFIX: &str = "audit-archive-";

/// Check whether a file name matches the archive pattern
pub(crate) fn is_archive_name(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX) && name.ends_with(".json")
}

impl AuditLedger {
    /// Remove entries whose retention has expired
    ///
    /// Entries whose policy (resolved again at sweep time) asks for
    /// archiving are copied to the archive first; if that copy fails they
    /// stay in the live store. Returns the number of entries removed from
    /// live stores.
    pub async fn apply_retention_policies(&self) -> usize {
        let now = self.clock.now();
        let mut removed_total = 0;

        for store in self.stores_for_sweep().await {
            let entries = match self.read_store(&store).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        store = %store.display(),
                        error = %e,
                        "Skipping unreadable store during retention sweep"
                    );
                    continue;
                }
            };

            let (to_archive, to_delete): (Vec<AuditEntry>, Vec<AuditEntry>) = entries
                .into_iter()
                .filter(|entry| entry.is_expired(now))
                .partition(|entry| {
                    self.policies()
                        .resolve(entry.event_type, entry.compliance_type)
                        .archive_before_deletion
                });

            if to_archive.is_empty() && to_delete.is_empty() {
                continue;
            }

            let mut removable: HashSet<AuditEntryId> = to_delete.iter().map(|e| e.id).collect();

            if !to_archive.is_empty() {
                match self.append_to_archive(&to_archive, now).await {
                    Ok(()) => removable.extend(to_archive.iter().map(|e| e.id)),
                    Err(e) => error!(
                        store = %store.display(),
                        count = to_archive.len(),
                        error = %e,
                        "Failed to archive expired entries; keeping them in the live store"
                    ),
                }
            }

            match self.remove_confirmed(&store, &removable).await {
                Ok(removed) => removed_total += removed,
                Err(e) => {
                    warn!(store = %store.display(), error = %e, "Failed to remove expired entries")
                }
            }
        }

        info!(removed = removed_total, "Retention sweep completed");
        removed_total
    }

    /// Move entries appended at least `older_than_days` ago to the archive
    ///
    /// Age is measured from each entry's timestamp, not its retention
    /// expiry; `0` archives everything. Returns the number of entries moved.
    pub async fn archive_old_logs(&self, older_than_days: u32) -> usize {
        let now = self.clock.now();
        let cutoff = now.subtract_days(older_than_days);
        let mut moved_total = 0;

        for store in self.stores_for_sweep().await {
            let entries = match self.read_store(&store).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        store = %store.display(),
                        error = %e,
                        "Skipping unreadable store during archival"
                    );
                    continue;
                }
            };

            let old: Vec<AuditEntry> = entries
                .into_iter()
                .filter(|entry| entry.timestamp <= cutoff)
                .collect();
            if old.is_empty() {
                continue;
            }

            if let Err(e) = self.append_to_archive(&old, now).await {
                error!(
                    store = %store.display(),
                    error = %e,
                    "Failed to write archive; store left unchanged"
                );
                continue;
            }

            let ids: HashSet<AuditEntryId> = old.iter().map(|e| e.id).collect();
            match self.remove_confirmed(&store, &ids).await {
                Ok(moved) => moved_total += moved,
                Err(e) => warn!(
                    store = %store.display(),
                    error = %e,
                    "Failed to remove archived entries"
                ),
            }
        }

        info!(moved = moved_total, older_than_days, "Archival completed");
        moved_total
    }

    /// Delete archive files last written more than `older_than_days` ago
    ///
    /// Returns the number of archive files deleted. A missing archive
    /// directory deletes nothing.
    pub async fn purge_archived_logs(&self, older_than_days: u32) -> usize {
        let cutoff = self.clock.now().subtract_days(older_than_days);

        let files = match self.storage.list_files(&self.archive_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    archive_dir = %self.archive_dir.display(),
                    error = %e,
                    "Cannot list archive directory"
                );
                return 0;
            }
        };

        let mut purged = 0;
        for file in files.into_iter().filter(|f| is_archive_name(&f.name)) {
            if file.modified >= cutoff {
                continue;
            }

            let lock = self.locks.for_store(&file.path);
            let guard = lock.lock().await;
            let result = self.storage.remove_file(&file.path).await;
            drop(guard);
            drop(lock);

            match result {
                Ok(()) => {
                    self.locks.release(&file.path);
                    debug!(file = %file.path.display(), "Archive file purged");
                    purged += 1;
                }
                Err(e) => {
                    warn!(file = %file.path.display(), error = %e, "Failed to purge archive file")
                }
            }
        }

        info!(purged, older_than_days, "Archive purge completed");
        purged
    }

    /// Delete archive files older than the longest policy archive window
    ///
    /// Archive files mix entries from several policies, so a file is kept
    /// until every policy that archives is done with it. Deletes nothing
    /// when no policy archives.
    pub async fn purge_expired_archives(&self) -> usize {
        match self.policies().longest_archive_retention() {
            Some(days) => self.purge_archived_logs(days).await,
            None => {
                debug!("No policy archives entries; archive purge skipped");
                0
            }
        }
    }

    /// All archived entries, oldest first
    ///
    /// Unreadable archive files are skipped.
    pub async fn list_archived_logs(&self) -> Vec<AuditEntry> {
        let files = match self.storage.list_files(&self.archive_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    archive_dir = %self.archive_dir.display(),
                    error = %e,
                    "Cannot list archive directory"
                );
                return Vec::new();
            }
        };

        let mut archived = Vec::new();
        for file in files.into_iter().filter(|f| is_archive_name(&f.name)) {
            match self.read_store(&file.path).await {
                Ok(entries) => archived.extend(entries),
                Err(e) => warn!(
                    file = %file.path.display(),
                    error = %e,
                    "Skipping unreadable archive file"
                ),
            }
        }

        archived.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        archived
    }

    /// Archive directory, relative to the storage root
    pub fn archive_directory(&self) -> &Path {
        &self.archive_dir
    }

    /// Archive file receiving entries archived at `timestamp`
    pub(crate) fn archive_path_for(&self, timestamp: Timestamp) -> PathBuf {
        self.archive_dir
            .join(timestamp.format(&format!("{}%Y-%m-%d.json", ARCHIVE_PREFIX)))
    }

    async fn stores_for_sweep(&self) -> Vec<PathBuf> {
        match self.live_store_paths().await {
            Ok(stores) => stores,
            Err(e) => {
                warn!(error = %e, "Cannot list live stores");
                Vec::new()
            }
        }
    }

    /// Add entries to the archive file for `now`, skipping ids already there
    async fn append_to_archive(
        &self,
        entries: &[AuditEntry],
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        let path = self.archive_path_for(now);
        let lock = self.locks.for_store(&path);
        let _guard = lock.lock().await;

        let mut archived = self.read_store(&path).await?;
        let known: HashSet<AuditEntryId> = archived.iter().map(|e| e.id).collect();
        let before = archived.len();
        archived.extend(entries.iter().filter(|e| !known.contains(&e.id)).cloned());

        if archived.len() > before {
            self.write_store(&path, &archived).await?;
        }

        debug!(
            archive = %path.display(),
            added = archived.len() - before,
            "Entries archived"
        );
        Ok(())
    }

    /// Remove `ids` from a store under its lock
    ///
    /// Only entries still present are removed. Their hashes are added to the
    /// store's removal record first so verification can bridge the gap they
    /// leave. A store left empty is deleted along with its record.
    pub(crate) async fn remove_confirmed(
        &self,
        store: &Path,
        ids: &HashSet<AuditEntryId>,
    ) -> Result<usize, LedgerError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let lock = self.locks.for_store(store);
        let mut cursor = lock.lock().await;

        let entries = self.read_store(store).await?;
        let (removed, kept): (Vec<AuditEntry>, Vec<AuditEntry>) =
            entries.into_iter().partition(|entry| ids.contains(&entry.id));

        if removed.is_empty() {
            return Ok(0);
        }

        if kept.is_empty() {
            self.storage.remove_file(store).await?;
            let record = removal_record_path(store);
            if self.storage.exists(&record).await {
                self.storage.remove_file(&record).await?;
            }
        } else {
            let mut record = self.read_removal_record(store).await?;
            record.extend(
                removed
                    .iter()
                    .map(|e| (e.integrity_hash.clone(), e.previous_hash.clone())),
            );
            self.write_removal_record(store, &record).await?;
            self.write_store(store, &kept).await?;
        }
        cursor.last_hash = kept.last().map(|e| e.integrity_hash.clone());

        debug!(
            store = %store.display(),
            removed = removed.len(),
            remaining = kept.len(),
            "Entries removed from live store"
        );

        let store_deleted = kept.is_empty();
        drop(cursor);
        drop(lock);
        if store_deleted {
            self.locks.release(store);
        }

        Ok(removed.len())
    }
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
