use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncRead;
use tracing::info;

use crate::commands::{self, check::CheckReport, list::Listing, resolve::Resolved};
use crate::commands::{sweep::SweepStats, upload::UploadReceipt};
use crate::config::StorageConfig;
use crate::digest::ContentDigest;
use crate::error::Result;
use crate::index::HashIndex;
use crate::storage::BlobStore;

/// Content-addressed file store: a blob store plus the hash index over it,
/// both rooted in one data directory.
pub struct Vault {
    data_dir: PathBuf,
    blobs: BlobStore,
    index: HashIndex,
}

impl Vault {
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let data_dir = config.data_dir.clone();
        tokio::fs::create_dir_all(&data_dir).await?;
        let blobs = BlobStore::open(&data_dir).await?;
        let index = HashIndex::open(&data_dir).await?;
        info!(data_dir = %data_dir.display(), "vault opened");
        Ok(Self {
            data_dir,
            blobs,
            index,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    pub async fn upload<R: AsyncRead + Unpin>(
        &self,
        filename: &str,
        reader: R,
    ) -> Result<UploadReceipt> {
        commands::upload::run(self, filename, reader).await
    }

    pub async fn resolve(&self, digest: &ContentDigest) -> Result<Resolved> {
        commands::resolve::run(self, digest).await
    }

    pub async fn list_all(&self) -> Result<Vec<Listing>> {
        commands::list::run(self).await
    }

    pub async fn sweep(&self, max_age: Duration) -> Result<SweepStats> {
        commands::sweep::run(self, max_age).await
    }

    pub async fn check(&self, verify_data: bool) -> Result<CheckReport> {
        commands::check::run(self, verify_data).await
    }
}
