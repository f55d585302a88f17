mod blob_store;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{HashdropError, Result};

pub use self::blob_store::BlobStore;

/// One physical blob on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub stored_name: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

impl StoredFile {
    pub(crate) fn from_metadata(stored_name: &str, meta: &std::fs::Metadata) -> Result<Self> {
        Ok(Self {
            stored_name: stored_name.to_string(),
            size_bytes: meta.len(),
            modified_at: DateTime::<Utc>::from(meta.modified()?),
        })
    }

    /// True when the blob was last modified more than `max_age` before `now`.
    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.modified_at)
            .to_std()
            .map(|age| age > max_age)
            .unwrap_or(false)
    }
}

/// Generate a fresh working name for an upload.
///
/// The timestamp prefix keeps names roughly ordered by creation; the random
/// suffix keeps concurrent uploads from ever sharing a name.
pub fn new_stored_name() -> String {
    let ts = Utc::now().timestamp_micros();
    format!("{ts:020}-{:032x}", rand::random::<u128>())
}

/// Reject stored names that could escape the blob directory or collide
/// with temp files.
pub fn validate_stored_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(HashdropError::InvalidName(name.to_string()))
    }
}
