use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::SessionError;

/// StorageScope
///
/// Lifetime class of a visitor-storage entry. `Durable` entries survive a
/// sign-out unless explicitly removed, `Session` entries are wiped wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    Durable,
    Session,
}

impl StorageScope {
    pub const ALL: [StorageScope; 2] = [StorageScope::Durable, StorageScope::Session];
}

/// SessionStore
///
/// Per-visitor key/value storage, addressed by the session cookie value. Each
/// visitor owns one bucket per scope.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, sid: &str, scope: StorageScope, key: &str)
    -> Result<Option<String>, SessionError>;

    async fn set(
        &self,
        sid: &str,
        scope: StorageScope,
        key: &str,
        value: String,
    ) -> Result<(), SessionError>;

    async fn remove(&self, sid: &str, scope: StorageScope, key: &str) -> Result<(), SessionError>;

    async fn keys(&self, sid: &str, scope: StorageScope) -> Result<Vec<String>, SessionError>;

    /// Drops every entry of the bucket.
    async fn clear(&self, sid: &str, scope: StorageScope) -> Result<(), SessionError>;
}

pub type SessionStoreState = Arc<dyn SessionStore>;

/// Buckets untouched for this long are dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound on live buckets (two per visitor at most).
pub const DEFAULT_MAX_BUCKETS: usize = 100_000;

type BucketKey = (String, StorageScope);

struct Bucket {
    entries: HashMap<String, String>,
    touched: Instant,
}

/// MemorySessionStore
///
/// Process-local store. Sessions do not survive a restart, which only costs the
/// visitor a fresh sign-in. Idle buckets are evicted, and once `max_buckets`
/// are live the least recently used one makes room for a new visitor, so
/// anonymous traffic cannot grow it without bound.
pub struct MemorySessionStore {
    buckets: RwLock<HashMap<BucketKey, Bucket>>,
    idle_timeout: Duration,
    max_buckets: usize,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_BUCKETS)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(idle_timeout: Duration, max_buckets: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            idle_timeout,
            max_buckets,
        }
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }

    fn make_room(&self, buckets: &mut HashMap<BucketKey, Bucket>, now: Instant) {
        buckets.retain(|_, bucket| now.duration_since(bucket.touched) < self.idle_timeout);
        while !buckets.is_empty() && buckets.len() >= self.max_buckets {
            let oldest = buckets
                .iter()
                .min_by_key(|(_, bucket)| bucket.touched)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                tracing::debug!(sid = %key.0, "evicting least recently used session bucket");
                buckets.remove(&key);
            }
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(
        &self,
        sid: &str,
        scope: StorageScope,
        key: &str,
    ) -> Result<Option<String>, SessionError> {
        let mut buckets = self.buckets.write().await;
        Ok(buckets.get_mut(&(sid.to_string(), scope)).and_then(|bucket| {
            bucket.touched = Instant::now();
            bucket.entries.get(key).cloned()
        }))
    }

    async fn set(
        &self,
        sid: &str,
        scope: StorageScope,
        key: &str,
        value: String,
    ) -> Result<(), SessionError> {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        let bucket_key = (sid.to_string(), scope);
        if !buckets.contains_key(&bucket_key) {
            self.make_room(&mut buckets, now);
        }
        let bucket = buckets.entry(bucket_key).or_insert_with(|| Bucket {
            entries: HashMap::new(),
            touched: now,
        });
        bucket.touched = now;
        bucket.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, sid: &str, scope: StorageScope, key: &str) -> Result<(), SessionError> {
        let mut buckets = self.buckets.write().await;
        let bucket_key = (sid.to_string(), scope);
        if let Some(bucket) = buckets.get_mut(&bucket_key) {
            bucket.entries.remove(key);
            if bucket.entries.is_empty() {
                buckets.remove(&bucket_key);
            }
        }
        Ok(())
    }

    async fn keys(&self, sid: &str, scope: StorageScope) -> Result<Vec<String>, SessionError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(&(sid.to_string(), scope))
            .map(|bucket| bucket.entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, sid: &str, scope: StorageScope) -> Result<(), SessionError> {
        self.buckets.write().await.remove(&(sid.to_string(), scope));
        Ok(())
    }
}
