//! The memoization cache shared by loaders.
//!
//! Entries map a [`CacheKey`] to the promise for that key. Lookups go through
//! a concurrent map and never take the structural lock on a hit; inserts,
//! removals and evictions take the lock that guards the recency list, so the
//! map and the list always hold the same entries.

mod key;
mod pool;
mod recency;
mod subscription;

use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use generational_arena::Index;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::promise::Promise;

pub use key::{AnyKey, CacheKey};
pub use pool::{CacheOwner, CachePool};
pub use subscription::Subscription;

use recency::RecencyList;
use subscription::{Registry, Subscriber};

/// Smallest capacity a cache is created with, whatever size is requested.
pub const MIN_CACHE_SIZE: usize = 10;

/// Capacity used when none is configured.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Share of the capacity above which hits promote entries in the recency
/// list. Below it eviction is not close, so exact order is not maintained.
pub const DEFAULT_TOUCH_THRESHOLD: f32 = 0.7;

/// A type-erased view of a cached [`Promise`].
pub(crate) trait ErasedPromise: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn try_cancel(&self) -> bool;
}

impl<V, E> ErasedPromise for Promise<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn try_cancel(&self) -> bool {
        Promise::try_cancel(self)
    }
}

#[derive(Clone)]
struct Entry {
    slot: Index,
    promise: Arc<dyn ErasedPromise>,
}

type Node = (CacheKey, Arc<dyn ErasedPromise>);

/// An entry handed to subscribers once the structural lock is released.
type Delivery = (Vec<Arc<Subscriber>>, CacheKey, Arc<dyn ErasedPromise>);

/// A bounded, least-recently-used cache of promises.
pub struct PromiseCache {
    map: DashMap<CacheKey, Entry>,
    recency: Mutex<RecencyList<Node>>,
    usage: AtomicUsize,
    capacity: usize,
    touch_threshold: usize,
    subscribers: Registry,
    next_subscriber: AtomicU64,
}

impl Default for PromiseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl PromiseCache {
    /// Creates a cache holding at most `size` entries (at least
    /// [`MIN_CACHE_SIZE`]).
    pub fn new(size: usize) -> Self {
        Self::with_touch_threshold(size, DEFAULT_TOUCH_THRESHOLD)
    }

    /// Like [`new`](Self::new), promoting entries on hit only once usage
    /// exceeds `touch_threshold` (a share of capacity, `0.0..=1.0`).
    pub fn with_touch_threshold(size: usize, touch_threshold: f32) -> Self {
        let capacity = size.max(MIN_CACHE_SIZE);
        let ratio = touch_threshold.clamp(0.0, 1.0);
        PromiseCache {
            map: DashMap::new(),
            recency: Mutex::new(RecencyList::default()),
            usage: AtomicUsize::new(0),
            capacity,
            touch_threshold: (capacity as f32 * ratio) as usize,
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscriber: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.usage.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.map.contains_key(key)
    }

    /// The cached promise for `key`, if there is one of type `Promise<V, E>`.
    ///
    /// Counts as a use of the entry.
    pub fn get<V, E>(&self, key: &CacheKey) -> Option<Promise<V, E>>
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let entry = self.map.get(key).map(|e| e.value().clone())?;
        self.touch(entry.slot);
        downcast(&entry.promise)
    }

    /// Returns the cached promise for `key`, or inserts the one built by
    /// `factory`. The flag is `true` when the promise was already cached.
    ///
    /// `factory` runs at most once, under the structural lock, and only when
    /// the key is absent. If `key` is cached with a different promise type the
    /// factory's promise is returned without being cached.
    pub fn get_or_add<V, E, F>(&self, key: CacheKey, factory: F) -> (Promise<V, E>, bool)
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce(&CacheKey) -> Promise<V, E>,
    {
        if let Some(entry) = self.map.get(&key).map(|e| e.value().clone()) {
            self.touch(entry.slot);
            return match downcast(&entry.promise) {
                Some(promise) => (promise, true),
                None => (mismatched(&key, factory), false),
            };
        }

        let mut recency = self.recency.lock();
        if let Some(entry) = self.map.get(&key).map(|e| e.value().clone()) {
            drop(recency);
            return match downcast(&entry.promise) {
                Some(promise) => (promise, true),
                None => (mismatched(&key, factory), false),
            };
        }
        let promise = factory(&key);
        let delivery = self.insert_locked(&mut recency, key, Arc::new(promise.clone()));
        drop(recency);
        deliver(delivery);
        (promise, false)
    }

    /// Caches `promise` unless `key` is already present. Returns whether it
    /// was added.
    pub fn try_add<V, E>(&self, key: CacheKey, promise: Promise<V, E>) -> bool
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        self.try_add_with(key, move |_| promise)
    }

    /// Caches the promise built by `factory` unless `key` is already present.
    /// `factory` only runs when the promise will be added.
    pub fn try_add_with<V, E, F>(&self, key: CacheKey, factory: F) -> bool
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce(&CacheKey) -> Promise<V, E>,
    {
        if self.map.contains_key(&key) {
            return false;
        }
        let mut recency = self.recency.lock();
        if self.map.contains_key(&key) {
            return false;
        }
        let promise = factory(&key);
        let delivery = self.insert_locked(&mut recency, key, Arc::new(promise));
        drop(recency);
        deliver(delivery);
        true
    }

    /// Drops the entry for `key`. Its promise is left as it is.
    pub fn try_remove(&self, key: &CacheKey) -> bool {
        let mut recency = self.recency.lock();
        match self.map.remove(key) {
            Some((_, entry)) => {
                recency.remove(entry.slot);
                self.usage.fetch_sub(1, Ordering::AcqRel);
                trace!(?key, "removed cache entry");
                true
            }
            None => false,
        }
    }

    /// Drops the entry for `key` only if it still holds `promise`, leaving a
    /// newer promise cached under the same key alone.
    pub fn try_remove_promise<V, E>(&self, key: &CacheKey, promise: &Promise<V, E>) -> bool
    where
        V: 'static,
        E: 'static,
    {
        let mut recency = self.recency.lock();
        let current = self.map.get(key).map_or(false, |entry| {
            entry
                .promise
                .as_any()
                .downcast_ref::<Promise<V, E>>()
                .map_or(false, |cached| cached.ptr_eq(promise))
        });
        if !current {
            return false;
        }
        match self.map.remove(key) {
            Some((_, entry)) => {
                recency.remove(entry.slot);
                self.usage.fetch_sub(1, Ordering::AcqRel);
                trace!(?key, "evicted failed promise");
                true
            }
            None => false,
        }
    }

    /// Empties the cache and cancels every promise that is still pending, so
    /// callers waiting on an in-flight fetch are released.
    pub fn clear(&self) {
        let nodes = {
            let mut recency = self.recency.lock();
            let nodes = recency.drain();
            self.map.clear();
            self.usage.store(0, Ordering::Release);
            nodes
        };
        let cancelled = nodes
            .iter()
            .filter(|(_, promise)| promise.try_cancel())
            .count();
        debug!(entries = nodes.len(), cancelled, "cleared cache");
    }

    /// Cached keys from most to least recently used.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.recency
            .lock()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Calls `callback` with every value of type `V` that resolves in this
    /// cache, for entries already cached and for entries added later.
    ///
    /// Entries tagged `skip_type_tag` are left out, so a loader can feed a
    /// cache it also subscribes to without seeing its own entries.
    pub fn subscribe<V, E, C>(&self, callback: C, skip_type_tag: Option<&str>) -> Subscription
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        C: Fn(&CacheKey, &V) + Send + Sync + 'static,
    {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (subscriber, active) =
            Subscriber::new::<V, E, C>(id, skip_type_tag.map(Arc::from), callback);
        let subscriber = Arc::new(subscriber);

        // Registering and snapshotting under the structural lock means every
        // entry is seen exactly once: either in the snapshot or by the insert
        // path, which queues behind the replay until it is done.
        let existing: Vec<Node> = {
            let recency = self.recency.lock();
            self.subscribers.write().push(subscriber.clone());
            let mut nodes: Vec<Node> = recency.iter().cloned().collect();
            nodes.reverse();
            nodes
        };

        subscriber.replay(&existing);
        trace!(replayed = existing.len(), "cache subscriber registered");

        Subscription::new(id, active, &self.subscribers)
    }

    fn touch(&self, slot: Index) {
        if self.usage.load(Ordering::Acquire) > self.touch_threshold {
            self.recency.lock().move_to_front(slot);
        }
    }

    fn insert_locked(
        &self,
        recency: &mut RecencyList<Node>,
        key: CacheKey,
        promise: Arc<dyn ErasedPromise>,
    ) -> Delivery {
        let slot = recency.push_front((key.clone(), promise.clone()));
        self.map.insert(
            key.clone(),
            Entry {
                slot,
                promise: promise.clone(),
            },
        );
        self.usage.fetch_add(1, Ordering::AcqRel);
        trace!(?key, "cached promise");

        while self.usage.load(Ordering::Acquire) > self.capacity {
            match recency.pop_back() {
                Some((evicted, _)) => {
                    self.map.remove(&evicted);
                    self.usage.fetch_sub(1, Ordering::AcqRel);
                    debug!(key = ?evicted, "evicted least recently used entry");
                }
                None => break,
            }
        }

        let subscribers = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.wants(&key))
            .cloned()
            .collect();
        (subscribers, key, promise)
    }
}

fn downcast<V, E>(promise: &Arc<dyn ErasedPromise>) -> Option<Promise<V, E>>
where
    V: 'static,
    E: 'static,
{
    promise.as_any().downcast_ref::<Promise<V, E>>().cloned()
}

fn mismatched<V, E, F>(key: &CacheKey, factory: F) -> Promise<V, E>
where
    F: FnOnce(&CacheKey) -> Promise<V, E>,
{
    warn!(
        ?key,
        "cached promise has a different value type, loading without cache"
    );
    factory(key)
}

fn deliver((subscribers, key, promise): Delivery) {
    for subscriber in subscribers {
        subscriber.observe(&key, &promise);
    }
}
