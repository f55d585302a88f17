//! Durable digest → file mapping.
//!
//! Each entry is one JSON marker at `index/<shard>/<digest-hex>.json`.
//! Markers are staged in `index/.staging/`, fsynced, and published with a
//! hard link. `link(2)` refuses to replace an existing path, which makes
//! publication an atomic create-if-absent: for any digest exactly one
//! `register` call ever observes `Inserted`, and readers never see a
//! partially written marker.
//!
//! A marker whose blob is gone (or that cannot be parsed) is repaired by
//! [`HashIndex::retire`], which moves it into `index/.graveyard/` so that
//! the next `register` can link a fresh one. Retiring is serialized and
//! re-checks the marker first, so a healthy marker is never moved aside.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::digest::ContentDigest;
use crate::error::{HashdropError, Result};

const INDEX_DIR: &str = "index";
const STAGING_DIR: &str = ".staging";
const GRAVEYARD_DIR: &str = ".graveyard";
const MARKER_SUFFIX: &str = ".json";
const MAX_REGISTER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub digest: ContentDigest,
    /// Filename supplied by the first uploader of this content.
    pub filename: String,
    /// Blob store name holding the bytes.
    pub stored_name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    AlreadyExists(IndexEntry),
    /// A marker exists for the digest but cannot be read. Nothing was
    /// published; the caller should [`HashIndex::retire`] it and retry.
    Unreadable,
}

/// Result of walking every marker.
#[derive(Debug, Default)]
pub struct IndexScan {
    pub entries: Vec<IndexEntry>,
    /// Digests whose marker exists but does not parse.
    pub unreadable: Vec<ContentDigest>,
}

pub struct HashIndex {
    root: PathBuf,
    staging: PathBuf,
    graveyard: PathBuf,
    retire_lock: Mutex<()>,
}

/// Marker contents that make an entry unusable, as opposed to I/O failures.
fn is_unreadable(e: &HashdropError) -> bool {
    matches!(
        e,
        HashdropError::Serialization(_) | HashdropError::ConsistencyFault(_)
    )
}

impl HashIndex {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let root = data_dir.join(INDEX_DIR);
        let staging = root.join(STAGING_DIR);
        let graveyard = root.join(GRAVEYARD_DIR);
        tokio::fs::create_dir_all(&staging).await?;
        tokio::fs::create_dir_all(&graveyard).await?;
        Ok(Self {
            root,
            staging,
            graveyard,
            retire_lock: Mutex::new(()),
        })
    }

    fn marker_path(&self, digest: &ContentDigest) -> PathBuf {
        self.root
            .join(digest.shard_prefix())
            .join(format!("{}{MARKER_SUFFIX}", digest.to_hex()))
    }

    pub async fn lookup(&self, digest: &ContentDigest) -> Result<Option<IndexEntry>> {
        let data = match tokio::fs::read(self.marker_path(digest)).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: IndexEntry = serde_json::from_slice(&data)?;
        if entry.digest != *digest {
            return Err(HashdropError::ConsistencyFault(format!(
                "marker for {digest} records digest {}",
                entry.digest
            )));
        }
        Ok(Some(entry))
    }

    /// Publish `entry` unless a marker for its digest already exists.
    ///
    /// On conflict the existing entry is returned untouched.
    pub async fn register(&self, entry: &IndexEntry) -> Result<RegisterOutcome> {
        let marker = self.marker_path(&entry.digest);
        if let Some(shard) = marker.parent() {
            tokio::fs::create_dir_all(shard).await?;
        }

        let staged = self.stage(entry).await?;
        let outcome = self.publish(&staged, &marker, &entry.digest).await;
        if let Err(e) = tokio::fs::remove_file(&staged).await {
            warn!(path = %staged.display(), error = %e, "failed to remove staged marker");
        }
        outcome
    }

    async fn stage(&self, entry: &IndexEntry) -> Result<PathBuf> {
        let data = serde_json::to_vec(entry)?;
        let staged = self.staging.join(format!(
            "{}.{:016x}",
            entry.digest.to_hex(),
            rand::random::<u64>()
        ));
        let write_result: Result<()> = async {
            let mut file = tokio::fs::File::create(&staged).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;
        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e);
        }
        Ok(staged)
    }

    async fn publish(
        &self,
        staged: &Path,
        marker: &Path,
        digest: &ContentDigest,
    ) -> Result<RegisterOutcome> {
        for _ in 0..MAX_REGISTER_ATTEMPTS {
            match tokio::fs::hard_link(staged, marker).await {
                Ok(()) => {
                    debug!(%digest, "index entry registered");
                    return Ok(RegisterOutcome::Inserted);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    // The marker may vanish between the failed link and the
                    // read if the sweeper evicts it; try to link again then.
                    match self.lookup(digest).await {
                        Ok(Some(existing)) => return Ok(RegisterOutcome::AlreadyExists(existing)),
                        Ok(None) => {}
                        Err(e) if is_unreadable(&e) => {
                            warn!(%digest, error = %e, "existing index marker is unreadable");
                            return Ok(RegisterOutcome::Unreadable);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(HashdropError::ConsistencyFault(format!(
            "index marker for {digest} kept changing during registration"
        )))
    }

    /// Move a broken marker for `digest` out of the way.
    ///
    /// `stale` is the entry the caller found dangling, or `None` when the
    /// marker was unreadable. The marker is only retired if it is still
    /// in that state; if it has already been retired or replaced by a
    /// healthy one this returns `false` and the caller should simply
    /// register again.
    pub async fn retire(&self, digest: &ContentDigest, stale: Option<&IndexEntry>) -> Result<bool> {
        let _guard = self.retire_lock.lock().await;

        let still_broken = match (self.lookup(digest).await, stale) {
            (Ok(None), _) => false,
            (Ok(Some(current)), Some(stale)) => current.stored_name == stale.stored_name,
            (Ok(Some(_)), None) => false,
            (Err(e), _) if is_unreadable(&e) => true,
            (Err(e), _) => return Err(e),
        };
        if !still_broken {
            return Ok(false);
        }

        let grave = self.graveyard.join(format!(
            "{}.{:016x}",
            digest.to_hex(),
            rand::random::<u64>()
        ));
        match tokio::fs::rename(self.marker_path(digest), &grave).await {
            Ok(()) => {}
            // Another process retired it first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = tokio::fs::remove_file(&grave).await {
            warn!(path = %grave.display(), error = %e, "failed to remove retired marker");
        }
        info!(%digest, "broken index marker retired");
        Ok(true)
    }

    /// Remove the marker for `digest`. Removing an absent marker succeeds.
    pub async fn remove(&self, digest: &ContentDigest) -> Result<()> {
        match tokio::fs::remove_file(self.marker_path(digest)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All readable entries. Unreadable markers are logged and skipped.
    pub async fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.scan().await?.entries)
    }

    /// Walk every marker, separating readable entries from broken ones.
    pub async fn scan(&self) -> Result<IndexScan> {
        let mut out = IndexScan::default();
        let mut shards = tokio::fs::read_dir(&self.root).await?;
        while let Some(shard) = shards.next_entry().await? {
            let shard_name = shard.file_name().to_string_lossy().into_owned();
            if shard_name.starts_with('.') || !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut markers = tokio::fs::read_dir(shard.path()).await?;
            while let Some(marker) = markers.next_entry().await? {
                let name = marker.file_name().to_string_lossy().into_owned();
                let Some(hex) = name.strip_suffix(MARKER_SUFFIX) else {
                    continue;
                };
                let Ok(digest) = ContentDigest::from_hex(hex) else {
                    warn!(marker = %name, "skipping marker with malformed name");
                    continue;
                };
                match self.lookup(&digest).await {
                    Ok(Some(entry)) => out.entries.push(entry),
                    Ok(None) => {}
                    Err(e) if is_unreadable(&e) => {
                        warn!(%digest, error = %e, "unreadable index marker");
                        out.unreadable.push(digest);
                    }
                    Err(e) => warn!(%digest, error = %e, "skipping index marker"),
                }
            }
        }
        Ok(out)
    }

    /// Delete staged and retired markers older than `max_age`, left behind
    /// by a crash between writing and cleanup.
    pub async fn purge_stale(&self, max_age: Duration) -> Result<usize> {
        let mut removed = 0;
        for dir in [&self.staging, &self.graveyard] {
            let mut files = tokio::fs::read_dir(dir).await?;
            while let Some(file) = files.next_entry().await? {
                let Ok(meta) = file.metadata().await else {
                    continue;
                };
                let expired = meta
                    .modified()
                    .ok()
                    .and_then(|m| m.elapsed().ok())
                    .is_some_and(|age| age > max_age);
                if !meta.is_file() || !expired {
                    continue;
                }
                match tokio::fs::remove_file(file.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(path = %file.path().display(), error = %e, "failed to purge stale marker"),
                }
            }
        }
        Ok(removed)
    }
}
