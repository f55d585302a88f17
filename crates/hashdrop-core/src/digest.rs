use std::fmt;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{ready, Context, Poll};

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::error::{HashdropError, Result};

type Blake2b256 = Blake2b<U32>;

/// Read buffer used when hashing an existing stream.
pub const HASH_BUF_SIZE: usize = 256 * 1024;

/// A 32-byte BLAKE2b-256 digest of a file's bytes. This is the public,
/// permanent reference to an uploaded file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Digest of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Parse the 64-character hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 64 {
            return Err(HashdropError::InvalidDigest(s.to_string()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)
            .map_err(|_| HashdropError::InvalidDigest(s.to_string()))?;
        Ok(ContentDigest(out))
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First byte as a two-char hex string, used for the index shard directory.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl FromStr for ContentDigest {
    type Err = HashdropError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental BLAKE2b-256 state.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Blake2b256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    pub fn finalize(self) -> ContentDigest {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Digest::finalize(self.inner));
        ContentDigest(out)
    }
}

/// Hash a stream to its end with a bounded buffer.
///
/// A read error aborts the computation; no partial digest is returned.
pub async fn hash_reader<R: AsyncRead + Unpin>(mut reader: R) -> Result<ContentDigest> {
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// `AsyncRead` adapter that feeds every byte it yields into a [`ContentHasher`].
///
/// Wrapping the upload stream with this while it is written to the blob store
/// yields the digest of exactly the bytes that were persisted.
pub struct HashingReader<R> {
    inner: R,
    hasher: ContentHasher,
    bytes_read: u64,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: ContentHasher::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consume the adapter and return the digest of everything read so far.
    pub fn finalize(self) -> ContentDigest {
        self.hasher.finalize()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let fresh = &buf.filled()[before..];
        this.hasher.update(fresh);
        this.bytes_read += fresh.len() as u64;
        Poll::Ready(Ok(()))
    }
}
