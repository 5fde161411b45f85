use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{PromiseCache, DEFAULT_CACHE_SIZE, DEFAULT_TOUCH_THRESHOLD};
use crate::pool::{ObjectPool, Reset};

impl Reset for Arc<PromiseCache> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Recycles caches between units of work, such as one per incoming request.
pub struct CachePool {
    caches: ObjectPool<Arc<PromiseCache>>,
    cache_size: usize,
    touch_threshold: f32,
}

impl Default for CachePool {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl CachePool {
    /// A pool handing out caches of `cache_size` entries, keeping up to the
    /// default number of idle caches.
    pub fn new(cache_size: usize) -> Self {
        CachePool {
            caches: ObjectPool::default(),
            cache_size,
            touch_threshold: DEFAULT_TOUCH_THRESHOLD,
        }
    }

    /// Keeps at most `capacity` idle caches.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.caches = ObjectPool::new(capacity);
        self
    }

    pub fn with_touch_threshold(mut self, touch_threshold: f32) -> Self {
        self.touch_threshold = touch_threshold;
        self
    }

    /// Idle caches waiting to be rented.
    pub fn available(&self) -> usize {
        self.caches.available()
    }

    /// Rents a cache for one scope. The cache comes back to the pool, cleared,
    /// when the returned owner is dropped.
    pub fn rent(self: &Arc<Self>) -> CacheOwner {
        let cache = self.caches.get_with(|| {
            Arc::new(PromiseCache::with_touch_threshold(
                self.cache_size,
                self.touch_threshold,
            ))
        });
        CacheOwner {
            cache,
            scope: CancellationToken::new(),
            pool: Some(self.clone()),
        }
    }
}

/// Scope guard for a cache rented from a [`CachePool`].
///
/// Disposing the owner cancels its scope token and clears the cache, which
/// cancels promises that are still pending. This happens once, on the first
/// `dispose` or on drop.
///
/// The cache only goes back to the pool if nothing else holds it by then.
/// A loader given the cache with `with_cache` keeps it out of the pool for as
/// long as the loader lives, so a loader outliving its scope can never write
/// into a cache another scope has rented since.
pub struct CacheOwner {
    cache: Arc<PromiseCache>,
    scope: CancellationToken,
    pool: Option<Arc<CachePool>>,
}

impl CacheOwner {
    pub fn cache(&self) -> &Arc<PromiseCache> {
        &self.cache
    }

    /// Cancelled when the owner is disposed.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub fn is_disposed(&self) -> bool {
        self.pool.is_none()
    }

    pub fn dispose(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.scope.cancel();
            if Arc::strong_count(&self.cache) == 1 {
                pool.caches.put(self.cache.clone());
                trace!("returned cache to pool");
            } else {
                self.cache.clear();
                debug!("cache still shared after dispose, not pooled");
            }
        }
    }
}

impl Drop for CacheOwner {
    fn drop(&mut self) {
        self.dispose();
    }
}
