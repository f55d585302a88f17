use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::digest::ContentDigest;
use crate::error::Result;
use crate::vault::Vault;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub digest: ContentDigest,
    pub filename: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Every resolvable file, newest first. Entries whose blob is missing are
/// logged and left out.
pub async fn run(vault: &Vault) -> Result<Vec<Listing>> {
    let mut listings = Vec::new();
    for entry in vault.index().entries().await? {
        let Some(blob) = vault.blobs().stat(&entry.stored_name).await? else {
            warn!(
                digest = %entry.digest,
                stored_name = %entry.stored_name,
                "consistency fault: listed entry has no blob"
            );
            continue;
        };
        listings.push(Listing {
            digest: entry.digest,
            filename: entry.filename,
            size_bytes: blob.size_bytes,
            created_at: entry.created_at,
        });
    }
    listings.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    Ok(listings)
}
