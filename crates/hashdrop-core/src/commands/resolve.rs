use tokio::fs::File;
use tracing::error;

use crate::digest::ContentDigest;
use crate::error::{HashdropError, Result};
use crate::vault::Vault;

/// An open download: the first uploader's filename plus a streaming handle
/// on the blob.
#[derive(Debug)]
pub struct Resolved {
    pub digest: ContentDigest,
    pub filename: String,
    pub size_bytes: u64,
    pub reader: File,
}

/// Resolve a digest to its blob.
///
/// An entry whose blob is missing (or a marker that cannot be read) is a
/// consistency fault: it is logged and reported to the caller as
/// `NotFound`, never as a hard failure.
pub async fn run(vault: &Vault, digest: &ContentDigest) -> Result<Resolved> {
    let entry = match vault.index().lookup(digest).await {
        Ok(Some(entry)) => entry,
        Ok(None) => return Err(HashdropError::NotFound(digest.to_hex())),
        Err(e @ (HashdropError::ConsistencyFault(_) | HashdropError::Serialization(_))) => {
            error!(%digest, error = %e, "consistency fault: unreadable index entry");
            return Err(HashdropError::NotFound(digest.to_hex()));
        }
        Err(e) => return Err(e),
    };

    match vault.blobs().get(&entry.stored_name).await {
        Ok((reader, stored)) => Ok(Resolved {
            digest: *digest,
            filename: entry.filename,
            size_bytes: stored.size_bytes,
            reader,
        }),
        Err(HashdropError::NotFound(_)) => {
            let fault = HashdropError::ConsistencyFault(format!(
                "index entry {digest} references missing blob '{}'",
                entry.stored_name
            ));
            error!(%digest, error = %fault, "consistency fault");
            Err(HashdropError::NotFound(digest.to_hex()))
        }
        Err(e) => Err(e),
    }
}
