use crate::digest::{hash_reader, ContentDigest, ContentHasher, HashingReader};
use tokio::io::AsyncReadExt;

#[test]
fn compute_deterministic() {
    let a = ContentDigest::compute(b"hello world");
    let b = ContentDigest::compute(b"hello world");
    assert_eq!(a, b);
}

#[test]
fn different_content_different_digest() {
    assert_ne!(
        ContentDigest::compute(b"hello"),
        ContentDigest::compute(b"world")
    );
}

#[test]
fn chunking_does_not_change_digest() {
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let mut hasher = ContentHasher::new();
    for chunk in data.chunks(7) {
        hasher.update(chunk);
    }
    assert_eq!(hasher.finalize(), ContentDigest::compute(&data));
}

#[test]
fn hex_round_trip_and_shard() {
    let digest = ContentDigest([0xAB; 32]);
    let hex = digest.to_hex();
    assert_eq!(hex.len(), 64);
    assert_eq!(digest.shard_prefix(), "ab");
    assert_eq!(ContentDigest::from_hex(&hex).unwrap(), digest);
    assert_eq!(hex.parse::<ContentDigest>().unwrap(), digest);
}

#[test]
fn from_hex_rejects_malformed() {
    assert!(ContentDigest::from_hex("").is_err());
    assert!(ContentDigest::from_hex("abcd").is_err());
    assert!(ContentDigest::from_hex(&"zz".repeat(32)).is_err());
    assert!(ContentDigest::from_hex(&"../".repeat(22)[..64]).is_err());
}

#[test]
fn serializes_as_hex_string() {
    let digest = ContentDigest::compute(b"json");
    let json = serde_json::to_string(&digest).unwrap();
    assert_eq!(json, format!("\"{}\"", digest.to_hex()));
    let back: ContentDigest = serde_json::from_str(&json).unwrap();
    assert_eq!(back, digest);
}

#[tokio::test]
async fn hash_reader_matches_compute() {
    let data = vec![0x5Au8; 600 * 1024];
    let digest = hash_reader(&data[..]).await.unwrap();
    assert_eq!(digest, ContentDigest::compute(&data));
}

#[tokio::test]
async fn hash_reader_propagates_stream_errors() {
    let reader = crate::testutil::BrokenReader::new(vec![1, 2, 3]);
    assert!(hash_reader(reader).await.is_err());
}

#[tokio::test]
async fn hashing_reader_passes_bytes_through() {
    let data = b"pass-through bytes".to_vec();
    let mut reader = HashingReader::new(&data[..]);
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, data);
    assert_eq!(reader.bytes_read(), data.len() as u64);
    assert_eq!(reader.finalize(), ContentDigest::compute(&data));
}
