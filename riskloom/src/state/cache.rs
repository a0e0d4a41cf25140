// src/state/cache.rs
//
// Content-addressed disk cache for the fetcher (spec §4.1): keys are
// `sha256(address || chain_id || kind)`, entries expire after a TTL, and
// writes land via a temp-file-then-rename so a reader never observes a
// half-written entry. Grounded on this codebase's state store's
// write-ahead-then-swap persistence pattern, narrowed from an in-memory
// sliding window to a disk-backed key/value cache.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::Address;

pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>, ttl_seconds: u64) -> Self {
        Cache {
            dir: dir.into(),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// `sha256(address || chain_id || kind)`, hex-encoded. `kind` is the
    /// fetch action (`txlist`, `tokentx`, `txlistinternal`, `balance`, ...).
    pub fn key(address: &Address, chain_id: u64, kind: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(address.as_str().as_bytes());
        hasher.update(chain_id.to_le_bytes());
        hasher.update(kind.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns the cached bytes if present and still within the TTL.
    /// Readers tolerate an absent or partially-written file — either reads
    /// as a cache miss, never an error, since a miss just falls through to
    /// a live fetch.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        let metadata = fs::metadata(&path).await.ok()?;
        let modified = metadata.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age > self.ttl {
            debug!(key, age_secs = age.as_secs(), "cache entry expired");
            return None;
        }
        fs::read(&path).await.ok()
    }

    /// Writes `value` under `key` via a temp file in the same directory
    /// followed by an atomic rename, so a concurrent reader never sees a
    /// truncated write. Failures are logged, never propagated — a failed
    /// cache write degrades to "fetch again next time", not an error the
    /// caller needs to handle.
    pub async fn put(&self, key: &str, value: &[u8]) {
        if let Err(e) = fs::create_dir_all(&self.dir).await {
            warn!(error = %e, dir = %self.dir.display(), "failed to create cache directory");
            return;
        }
        let final_path = self.entry_path(key);
        let tmp_path = self.dir.join(format!("{key}.tmp-{}", std::process::id()));

        if let Err(e) = fs::write(&tmp_path, value).await {
            warn!(error = %e, "failed to write cache temp file");
            return;
        }
        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            warn!(error = %e, "failed to rename cache temp file into place");
            let _ = fs::remove_file(&tmp_path).await;
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Sweeps expired entries from the cache directory. Not called on any
    /// fixed schedule — the orchestrator may invoke this between batch runs.
    pub async fn sweep_expired(&self) -> usize {
        let Ok(mut entries) = fs::read_dir(&self.dir).await else {
            return 0;
        };
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().map(|e| e == "tmp").unwrap_or(false) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            let age = SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO);
            if age > self.ttl {
                if fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{n:040x}")).unwrap()
    }

    #[test]
    fn key_is_deterministic_and_kind_sensitive() {
        let a = addr(1);
        let k1 = Cache::key(&a, 1, "txlist");
        let k2 = Cache::key(&a, 1, "txlist");
        let k3 = Cache::key(&a, 1, "tokentx");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[tokio::test]
    async fn round_trips_through_put_and_get() {
        let tmp = std::env::temp_dir().join(format!("riskloom-cache-test-{}", std::process::id()));
        let cache = Cache::new(&tmp, 300);
        let key = Cache::key(&addr(2), 1, "balance");
        cache.put(&key, b"hello").await;
        let got = cache.get(&key).await;
        assert_eq!(got.as_deref(), Some(&b"hello"[..]));
        let _ = fs::remove_dir_all(&tmp).await;
    }

    #[tokio::test]
    async fn missing_entry_is_a_clean_miss() {
        let tmp = std::env::temp_dir().join(format!("riskloom-cache-test-miss-{}", std::process::id()));
        let cache = Cache::new(&tmp, 300);
        let key = Cache::key(&addr(3), 1, "txlist");
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let tmp = std::env::temp_dir().join(format!("riskloom-cache-test-expired-{}", std::process::id()));
        let cache = Cache::new(&tmp, 0);
        let key = Cache::key(&addr(4), 1, "txlist");
        cache.put(&key, b"stale").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get(&key).await.is_none());
        let _ = fs::remove_dir_all(&tmp).await;
    }
}
