use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{error, info, warn};

use crate::digest::{ContentDigest, HashingReader};
use crate::error::{HashdropError, Result};
use crate::index::{IndexEntry, RegisterOutcome};
use crate::storage::new_stored_name;
use crate::vault::Vault;

const READ_BUF_SIZE: usize = 64 * 1024;
const FALLBACK_FILENAME: &str = "upload.bin";
const MAX_COMMIT_ATTEMPTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub digest: ContentDigest,
    /// Filename the digest resolves to. For a duplicate this is the first
    /// uploader's name, not the one just supplied.
    pub filename: String,
    pub size_bytes: u64,
    /// True when identical content was already stored.
    pub deduplicated: bool,
}

/// Store one upload and return its digest.
///
/// The stream is written under a fresh working name while being hashed.
/// Registration happens only after the blob is durable; if the digest is
/// already registered the new blob is deleted and the existing entry wins.
pub async fn run<R: AsyncRead + Unpin>(
    vault: &Vault,
    filename: &str,
    reader: R,
) -> Result<UploadReceipt> {
    let filename = sanitize_filename(filename);

    let mut reader = BufReader::with_capacity(READ_BUF_SIZE, reader);
    if reader.fill_buf().await?.is_empty() {
        return Err(HashdropError::EmptyUpload);
    }

    let stored_name = new_stored_name();
    let mut hashing = HashingReader::new(reader);
    let stored = vault.blobs().put(&stored_name, &mut hashing).await?;
    let digest = hashing.finalize();

    let entry = IndexEntry {
        digest,
        filename,
        stored_name: stored.stored_name.clone(),
        size_bytes: stored.size_bytes,
        created_at: Utc::now(),
    };

    match commit(vault, &entry).await {
        Ok(receipt) => Ok(receipt),
        Err(e) => {
            discard_blob(vault, &stored_name).await;
            Err(e)
        }
    }
}

/// Register `entry`, repairing a broken marker for its digest on the way.
///
/// Every path to `Inserted` goes through the hard-link publish, so even
/// when several uploads repair the same marker only one of them wins.
async fn commit(vault: &Vault, entry: &IndexEntry) -> Result<UploadReceipt> {
    let digest = entry.digest;
    for _ in 0..MAX_COMMIT_ATTEMPTS {
        let stale = match vault.index().register(entry).await? {
            RegisterOutcome::Inserted => {
                info!(
                    %digest,
                    filename = %entry.filename,
                    size = entry.size_bytes,
                    "upload stored"
                );
                return Ok(UploadReceipt {
                    digest,
                    filename: entry.filename.clone(),
                    size_bytes: entry.size_bytes,
                    deduplicated: false,
                });
            }
            RegisterOutcome::AlreadyExists(existing) => {
                // The link must live as long as a fresh upload's would.
                match vault.blobs().touch(&existing.stored_name).await {
                    Ok(()) => {
                        discard_blob(vault, &entry.stored_name).await;
                        info!(
                            %digest,
                            filename = %entry.filename,
                            canonical = %existing.filename,
                            "duplicate upload discarded"
                        );
                        return Ok(UploadReceipt {
                            digest,
                            filename: existing.filename,
                            size_bytes: existing.size_bytes,
                            deduplicated: true,
                        });
                    }
                    Err(HashdropError::NotFound(_)) => {
                        error!(
                            %digest,
                            missing_blob = %existing.stored_name,
                            "consistency fault: index entry without blob, repairing"
                        );
                        Some(existing)
                    }
                    Err(e) => return Err(e),
                }
            }
            RegisterOutcome::Unreadable => {
                error!(%digest, "consistency fault: unreadable index marker, repairing");
                None
            }
        };
        vault.index().retire(&digest, stale.as_ref()).await?;
    }
    Err(HashdropError::ConsistencyFault(format!(
        "index marker for {digest} could not be repaired"
    )))
}

/// Best-effort removal of a blob that will never be referenced. Failures
/// leave an orphan for the retention sweeper.
async fn discard_blob(vault: &Vault, stored_name: &str) {
    if let Err(e) = vault.blobs().remove(stored_name).await {
        warn!(stored_name, error = %e, "failed to remove redundant blob");
    }
}

/// Reduce a client-supplied filename to its final path component.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();
    let base = base.trim();
    if base.is_empty() || base == "." || base == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        base.to_string()
    }
}
