//! The distributed request cache (spec.md §3 "Request Cache Entry", §4.3,
//! §6 "Cache interface").
//!
//! The [`Cache`] trait is the injection point: production deployments back
//! it with whatever shared TTL-capable blob store they already operate
//! (Redis, a database table, ...). [`MemoryCache`] is the in-memory,
//! single-process default used by tests and the demonstration binary —
//! the same shape as the teacher's `AuthState` session map: a `HashMap`
//! behind a `tokio::sync::RwLock`, swept lazily on access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub type DynCache = Arc<dyn Cache>;

/// In-memory `Cache` implementation. Entries past their expiry are dropped
/// lazily the next time the map is touched, rather than via a background
/// sweep — there is no ordering guarantee beyond last-write-wins on a single
/// key, which is exactly the guarantee spec.md §4.3 asks for.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expiry)) if *expiry > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                drop(entries);
                self.entries.write().await.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// TTL for a stashed authorization request (spec.md §3).
pub const REQUEST_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Wire format for a request-cache entry (spec.md §3/§6):
/// `version (i32 LE) | count (i32 LE) | {len-prefixed key, len-prefixed value}*`.
/// Any reader must reject a version other than `1`.
pub mod blob {
    const VERSION: i32 = 1;

    pub fn encode(params: &[(String, String)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(params.len() as i32).to_le_bytes());
        for (k, v) in params {
            write_string(&mut out, k);
            write_string(&mut out, v);
        }
        out
    }

    fn write_string(out: &mut Vec<u8>, s: &str) {
        let bytes = s.as_bytes();
        out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
        out.extend_from_slice(bytes);
    }

    /// Decodes a blob, returning `None` if the version tag doesn't match `1`
    /// — callers must treat that the same as a cache miss (spec.md §4.4
    /// step 2: "Blob's stored version must equal 1, else delete and same
    /// error").
    pub fn decode(data: &[u8]) -> Option<Vec<(String, String)>> {
        if data.len() < 8 {
            return None;
        }
        let version = i32::from_le_bytes(data[0..4].try_into().ok()?);
        if version != VERSION {
            return None;
        }
        let count = i32::from_le_bytes(data[4..8].try_into().ok()?);
        if count < 0 {
            return None;
        }
        let mut cursor = 8usize;
        let mut params = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = read_string(data, &mut cursor)?;
            let value = read_string(data, &mut cursor)?;
            params.push((key, value));
        }
        Some(params)
    }

    fn read_string(data: &[u8], cursor: &mut usize) -> Option<String> {
        if data.len() < *cursor + 4 {
            return None;
        }
        let len = i32::from_le_bytes(data[*cursor..*cursor + 4].try_into().ok()?);
        if len < 0 {
            return None;
        }
        let len = len as usize;
        *cursor += 4;
        if data.len() < *cursor + len {
            return None;
        }
        let s = std::str::from_utf8(&data[*cursor..*cursor + len]).ok()?.to_string();
        *cursor += len;
        Some(s)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn round_trips_arbitrary_params() {
            let params = vec![
                ("client_id".to_string(), "c1".to_string()),
                ("redirect_uri".to_string(), "https://rp/cb".to_string()),
                ("".to_string(), "".to_string()),
            ];
            let encoded = encode(&params);
            assert_eq!(decode(&encoded), Some(params));
        }

        #[test]
        fn rejects_unknown_version() {
            let mut data = encode(&[("a".to_string(), "b".to_string())]);
            data[0] = 2;
            assert_eq!(decode(&data), None);
        }

        #[test]
        fn rejects_truncated_blob() {
            let data = encode(&[("a".to_string(), "b".to_string())]);
            assert_eq!(decode(&data[..data.len() - 1]), None);
        }
    }
}
