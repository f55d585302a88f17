use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::{validate_stored_name, StoredFile};
use crate::error::{HashdropError, Result};

const BLOBS_DIR: &str = "blobs";
const TMP_DIR: &str = "tmp";
const WRITE_BUF_SIZE: usize = 256 * 1024;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem blob store: `<root>/blobs/<name>`, with in-progress writes
/// staged under `<root>/tmp/`.
pub struct BlobStore {
    blob_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl BlobStore {
    /// Open (and create if needed) the blob directories under `root`.
    pub async fn open(root: &Path) -> Result<Self> {
        let blob_dir = root.join(BLOBS_DIR);
        let tmp_dir = root.join(TMP_DIR);
        tokio::fs::create_dir_all(&blob_dir).await?;
        tokio::fs::create_dir_all(&tmp_dir).await?;
        Ok(Self { blob_dir, tmp_dir })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_stored_name(name)?;
        Ok(self.blob_dir.join(name))
    }

    /// Stream `reader` to the blob `name`, replacing any existing blob.
    ///
    /// Bytes go to a temp file that is flushed and fsynced before being
    /// renamed into place, so a blob is either absent or complete. If the
    /// stream fails midway the temp file is removed and the error returned.
    pub async fn put<R: AsyncRead + Unpin>(&self, name: &str, reader: &mut R) -> Result<StoredFile> {
        let final_path = self.resolve(name)?;
        let unique_id = TEMP_COUNTER.fetch_add(1, Relaxed);
        let temp_path = self.tmp_dir.join(format!("{name}.{unique_id}.part"));

        let temp_file = File::create(&temp_path).await?;
        let mut writer = BufWriter::new(temp_file);
        let write_result: Result<()> = async {
            let mut buf = vec![0u8; WRITE_BUF_SIZE];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                writer.write_all(&buf[..n]).await?;
            }
            writer.flush().await?;
            writer.get_mut().sync_all().await?;
            Ok(())
        }
        .await;

        // Close the handle before cleanup or rename.
        drop(writer);

        if let Err(e) = write_result {
            discard_temp(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            discard_temp(&temp_path).await;
            return Err(e.into());
        }

        let meta = tokio::fs::metadata(&final_path).await?;
        let stored = StoredFile::from_metadata(name, &meta)?;
        debug!(stored_name = name, size = stored.size_bytes, "blob written");
        Ok(stored)
    }

    /// Open a blob for streaming reads.
    pub async fn get(&self, name: &str) -> Result<(File, StoredFile)> {
        let path = self.resolve(name)?;
        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HashdropError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata().await?;
        let stored = StoredFile::from_metadata(name, &meta)?;
        Ok((file, stored))
    }

    /// Metadata for a blob, or `None` if it does not exist.
    pub async fn stat(&self, name: &str) -> Result<Option<StoredFile>> {
        let path = self.resolve(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(StoredFile::from_metadata(name, &meta)?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reset a blob's modification time to now, restarting its retention
    /// clock. `NotFound` if the blob does not exist.
    pub async fn touch(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        let result = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::options().write(true).open(path)?;
            file.set_modified(SystemTime::now())
        })
        .await
        .map_err(std::io::Error::other)?;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HashdropError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob. Deleting an absent blob succeeds.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate all committed blobs.
    pub async fn list(&self) -> Result<Vec<StoredFile>> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.blob_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_stored_name(&name).is_err() {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(m) => m,
                // Removed between read_dir and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if meta.is_file() {
                out.push(StoredFile::from_metadata(&name, &meta)?);
            }
        }
        Ok(out)
    }

    /// Delete temp files left behind by crashed or abandoned writes.
    pub async fn purge_temp(&self, max_age: Duration) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.tmp_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let temp = StoredFile::from_metadata(&name, &meta)?;
            if !temp.is_older_than(max_age, now) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(temp = %name, error = %e, "failed to purge temp file"),
            }
        }
        Ok(removed)
    }

    #[cfg(test)]
    pub(crate) fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }
}

async fn discard_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove temp file");
        }
    }
}
