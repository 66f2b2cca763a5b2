//! Named cache buckets of request → response entries.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::FetchResponse;
use crate::error::Result;

/// Abstraction over the cache storage for testability.
///
/// Buckets are created on first write. Lookups across buckets honour
/// bucket order as reported by [`CacheStore::keys`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stores `response` under `key` in `bucket`, replacing any entry.
    async fn put(&self, bucket: &str, key: &str, response: &FetchResponse) -> Result<()>;

    /// Returns the entry for `key` in `bucket`.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<FetchResponse>>;

    /// Names of all buckets.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Deletes `bucket` and every entry in it. Returns whether it existed.
    async fn delete(&self, bucket: &str) -> Result<bool>;

    /// Stores every entry in `bucket`. If any write fails the bucket is
    /// deleted, so it never holds part of the set.
    async fn put_all(&self, bucket: &str, entries: &[(String, FetchResponse)]) -> Result<()> {
        for (key, response) in entries {
            if let Err(e) = self.put(bucket, key, response).await {
                if let Err(cleanup) = self.delete(bucket).await {
                    log::warn!("Could not remove partial bucket {bucket}: {cleanup}");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Returns the first entry for `key` across all buckets.
    async fn match_any(&self, key: &str) -> Result<Option<FetchResponse>> {
        for bucket in self.keys().await? {
            if let Some(response) = self.get(&bucket, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// In-memory buckets, ordered by creation.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    buckets: RwLock<Vec<(String, HashMap<String, FetchResponse>)>>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn put(&self, bucket: &str, key: &str, response: &FetchResponse) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let pos = if let Some(pos) = buckets.iter().position(|(name, _)| name == bucket) {
            pos
        } else {
            buckets.push((bucket.to_string(), HashMap::new()));
            buckets.len() - 1
        };
        buckets[pos].1.insert(key.to_string(), response.clone());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<FetchResponse>> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .find(|(name, _)| name == bucket)
            .and_then(|(_, entries)| entries.get(key).cloned()))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let buckets = self.buckets.read().await;
        Ok(buckets.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn delete(&self, bucket: &str) -> Result<bool> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|(name, _)| name != bucket);
        Ok(buckets.len() != before)
    }
}

/// Metadata line at the head of each entry file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    #[serde(flatten)]
    response: FetchResponse,
}

/// Distinguishes temp files of concurrent writers within this process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Encodes an entry as its JSON metadata, a newline, then the raw body.
fn encode_entry(key: &str, response: &FetchResponse) -> Result<Vec<u8>> {
    let meta = EntryMeta {
        key: key.to_string(),
        response: response.clone(),
    };
    let mut bytes = serde_json::to_vec(&meta)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&response.body);
    Ok(bytes)
}

fn decode_entry(bytes: &[u8]) -> Result<(EntryMeta, &[u8])> {
    let split = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "cache entry without header"))?;
    let meta = serde_json::from_slice(&bytes[..split])?;
    Ok((meta, &bytes[split + 1..]))
}

/// Buckets on disk: one directory per bucket, one file per entry named by
/// the SHA-256 of its key. Entries are replaced whole (write tmp + rename),
/// so a reader sees either the previous response or the new one.
///
/// Bucket order for [`CacheStore::match_any`] is lexicographic.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, bucket: &str, key: &str) -> PathBuf {
        let hash = format!("{:x}", Sha256::digest(key.as_bytes()));
        self.root.join(bucket).join(format!("{hash}.entry"))
    }
}

fn not_found_as_none<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn put(&self, bucket: &str, key: &str, response: &FetchResponse) -> Result<()> {
        tokio::fs::create_dir_all(self.root.join(bucket)).await?;
        let path = self.entry_path(bucket, key);
        let tmp_path = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let bytes = encode_entry(key, response)?;
        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<FetchResponse>> {
        let Some(raw) = not_found_as_none(tokio::fs::read(self.entry_path(bucket, key)).await)?
        else {
            return Ok(None);
        };
        let (meta, body) = decode_entry(&raw)?;
        if meta.key != key {
            return Ok(None);
        }
        Ok(Some(FetchResponse {
            body: bytes::Bytes::copy_from_slice(body),
            ..meta.response
        }))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let Some(mut entries) = not_found_as_none(tokio::fs::read_dir(&self.root).await)? else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, bucket: &str) -> Result<bool> {
        Ok(not_found_as_none(tokio::fs::remove_dir_all(self.root.join(bucket)).await)?.is_some())
    }
}
