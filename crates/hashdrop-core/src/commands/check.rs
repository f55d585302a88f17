use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use crate::digest::{hash_reader, ContentDigest};
use crate::error::Result;
use crate::vault::Vault;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub entries_checked: u64,
    pub blobs_checked: u64,
    /// Index entries whose blob is missing.
    pub dangling_entries: Vec<ContentDigest>,
    /// Markers that exist but cannot be parsed.
    pub unreadable_entries: Vec<ContentDigest>,
    /// Blobs no index entry refers to.
    pub orphan_blobs: Vec<String>,
    /// Entries whose blob no longer hashes to the digest (data checks only).
    pub digest_mismatches: Vec<ContentDigest>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.dangling_entries.is_empty()
            && self.unreadable_entries.is_empty()
            && self.orphan_blobs.is_empty()
            && self.digest_mismatches.is_empty()
    }
}

/// Cross-check the index against the blob store. With `verify_data`, every
/// referenced blob is re-hashed as well.
pub async fn run(vault: &Vault, verify_data: bool) -> Result<CheckReport> {
    let mut report = CheckReport::default();
    let mut referenced = HashSet::new();

    let scan = vault.index().scan().await?;
    report.unreadable_entries = scan.unreadable;
    for entry in scan.entries {
        report.entries_checked += 1;
        if vault.blobs().stat(&entry.stored_name).await?.is_none() {
            warn!(digest = %entry.digest, "check: index entry has no blob");
            report.dangling_entries.push(entry.digest);
            continue;
        }
        if verify_data {
            let (reader, _) = vault.blobs().get(&entry.stored_name).await?;
            let actual = hash_reader(reader).await?;
            if actual != entry.digest {
                warn!(digest = %entry.digest, %actual, "check: blob content does not match digest");
                report.digest_mismatches.push(entry.digest);
            }
        }
        referenced.insert(entry.stored_name);
    }

    for blob in vault.blobs().list().await? {
        report.blobs_checked += 1;
        if !referenced.contains(&blob.stored_name) {
            report.orphan_blobs.push(blob.stored_name);
        }
    }

    Ok(report)
}
