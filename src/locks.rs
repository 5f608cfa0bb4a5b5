//! Per-key async mutexes with idle eviction.
//!
//! Used for single-flight token refresh (keyed by account id) and for
//! serializing action execution (keyed by user and email).

use moka::future::Cache;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::constants::LOCK_IDLE_SECS;

#[derive(Clone)]
pub struct KeyedLocks<K>
where
    K: Hash + Eq + Send + Sync + Clone + 'static,
{
    locks: Cache<K, Arc<Mutex<()>>>,
}

impl<K> KeyedLocks<K>
where
    K: Hash + Eq + Send + Sync + Clone + 'static,
{
    /// No size cap, only idle expiry. An evicted entry would hand the next
    /// caller a second mutex for the same key.
    pub fn new() -> Self {
        Self {
            locks: Cache::builder()
                .time_to_idle(Duration::from_secs(LOCK_IDLE_SECS))
                .build(),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .get_with(key, async { Arc::new(Mutex::new(())) })
            .await;
        mutex.lock_owned().await
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Hash + Eq + Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
