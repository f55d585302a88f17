use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::vault::Vault;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Expired files removed together with their index entry.
    pub entries_evicted: u64,
    /// Index entries removed because their blob was already gone.
    pub dangling_entries_removed: u64,
    /// Markers removed because they could not be parsed.
    pub unreadable_entries_removed: u64,
    /// Unreferenced blobs older than the cutoff.
    pub orphan_blobs_removed: u64,
    pub temp_files_removed: u64,
    /// Staged or retired markers abandoned by a crash.
    pub stale_markers_removed: u64,
    pub bytes_freed: u64,
}

/// One retention pass.
///
/// For an expired file the index marker is removed before the blob, so a
/// concurrent resolve sees either a complete file or `NotFound`.
pub async fn run(vault: &Vault, max_age: Duration) -> Result<SweepStats> {
    let now = Utc::now();
    let mut stats = SweepStats::default();
    let mut referenced = HashSet::new();

    let scan = vault.index().scan().await?;
    for digest in &scan.unreadable {
        if vault.index().retire(digest, None).await? {
            stats.unreadable_entries_removed += 1;
        }
    }

    for entry in scan.entries {
        match vault.blobs().stat(&entry.stored_name).await? {
            Some(blob) if blob.is_older_than(max_age, now) => {
                vault.index().remove(&entry.digest).await?;
                vault.blobs().remove(&entry.stored_name).await?;
                stats.entries_evicted += 1;
                stats.bytes_freed += blob.size_bytes;
                info!(
                    digest = %entry.digest,
                    filename = %entry.filename,
                    "expired file removed"
                );
            }
            Some(_) => {
                referenced.insert(entry.stored_name);
            }
            None => {
                warn!(
                    digest = %entry.digest,
                    stored_name = %entry.stored_name,
                    "consistency fault: removing index entry without blob"
                );
                if vault.index().retire(&entry.digest, Some(&entry)).await? {
                    stats.dangling_entries_removed += 1;
                }
            }
        }
    }

    for blob in vault.blobs().list().await? {
        if referenced.contains(&blob.stored_name) || !blob.is_older_than(max_age, now) {
            continue;
        }
        vault.blobs().remove(&blob.stored_name).await?;
        stats.orphan_blobs_removed += 1;
        stats.bytes_freed += blob.size_bytes;
        debug!(stored_name = %blob.stored_name, "orphan blob removed");
    }

    stats.temp_files_removed = vault.blobs().purge_temp(max_age).await? as u64;
    stats.stale_markers_removed = vault.index().purge_stale(max_age).await? as u64;

    Ok(stats)
}

/// Run [`run`] every `every` until the task is dropped.
pub async fn run_periodic(vault: Arc<Vault>, every: Duration, max_age: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match run(&vault, max_age).await {
            Ok(stats) => info!(
                evicted = stats.entries_evicted,
                dangling = stats.dangling_entries_removed,
                unreadable = stats.unreadable_entries_removed,
                orphans = stats.orphan_blobs_removed,
                temp = stats.temp_files_removed,
                stale_markers = stats.stale_markers_removed,
                bytes_freed = stats.bytes_freed,
                "retention sweep finished"
            ),
            Err(e) => warn!(error = %e, "retention sweep failed"),
        }
    }
}
