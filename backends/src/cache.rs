//! Short-lived artifact cache: authenticated Git access tokens, resolved
//! `detected_ports`, and ongoing-update flags, per spec.md §6's "Persisted
//! state layout". Built on `ttl_cache`, the same crate the teacher's
//! `deployer`/`gateway` binaries pull in for request-scoped caching.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use ttl_cache::TtlCache as InnerTtlCache;

/// Github installation tokens are valid for 1h; cache for 59m so we never
/// hand out a token about to expire mid-clone.
pub const GITHUB_TOKEN_TTL: Duration = Duration::from_secs(59 * 60);
/// GitLab refreshed access tokens are valid for 2h; cache for 1h59m.
pub const GITLAB_TOKEN_TTL: Duration = Duration::from_secs((60 * 60) + (59 * 60));
pub const DETECTED_PORTS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A clonable, async-safe TTL cache. Cheap to clone (shares the backing
/// map via `Arc<Mutex<_>>`), the same handle-sharing pattern the teacher
/// uses for its `SqlitePool`-backed `Persistence`.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    inner: Arc<Mutex<InnerTtlCache<K, V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(InnerTtlCache::new(capacity))),
        }
    }

    pub async fn get_or_insert_with<F, Fut, E>(&self, key: K, ttl: Duration, f: F) -> Result<V, E>
    where
        K: Clone,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        {
            let guard = self.inner.lock().await;
            if let Some(value) = guard.get(&key) {
                return Ok(value.clone());
            }
        }

        let value = f().await?;
        let mut guard = self.inner.lock().await;
        guard.insert(key, value.clone(), ttl);
        Ok(value)
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let guard = self.inner.lock().await;
        guard.get(key).cloned()
    }

    pub async fn insert(&self, key: K, value: V, ttl: Duration) {
        let mut guard = self.inner.lock().await;
        guard.insert(key, value, ttl);
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock().await;
        guard.remove(key)
    }
}
