use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, ReadBuf};

use crate::config::StorageConfig;
use crate::vault::Vault;

pub async fn open_test_vault() -> (Vault, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let vault = Vault::open(&StorageConfig::new(tmp.path())).await.unwrap();
    (vault, tmp)
}

pub fn blob_path(data_dir: &Path, stored_name: &str) -> PathBuf {
    data_dir.join("blobs").join(stored_name)
}

/// Push a file's mtime `age` into the past.
pub fn backdate(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(files_under(&path));
            } else {
                out.push(path);
            }
        }
    }
    out
}

/// Yields `payload` and then fails, like a client that disconnects mid-upload.
pub struct BrokenReader {
    payload: Vec<u8>,
    pos: usize,
}

impl BrokenReader {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload, pos: 0 }
    }
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos >= this.payload.len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client went away",
            )));
        }
        let n = buf.remaining().min(this.payload.len() - this.pos);
        buf.put_slice(&this.payload[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}
