use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::{CacheKey, ErasedPromise, Node};
use crate::promise::Promise;

pub(super) type Registry = Arc<RwLock<Vec<Arc<Subscriber>>>>;

type Observe = Box<dyn Fn(&CacheKey, &dyn ErasedPromise) + Send + Sync>;

pub(super) struct Subscriber {
    id: u64,
    skip_type_tag: Option<Arc<str>>,
    observe: Observe,
    /// Entries inserted while the existing ones are replayed. `None` once
    /// the replay is over.
    replay: Mutex<Option<Vec<Node>>>,
}

impl Subscriber {
    pub fn new<V, E, C>(
        id: u64,
        skip_type_tag: Option<Arc<str>>,
        callback: C,
    ) -> (Self, Arc<AtomicBool>)
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        C: Fn(&CacheKey, &V) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let callback = Arc::new(callback);
        let flag = active.clone();
        let observe = move |key: &CacheKey, promise: &dyn ErasedPromise| {
            let promise = match promise.as_any().downcast_ref::<Promise<V, E>>() {
                Some(promise) => promise,
                None => return,
            };
            let key = key.clone();
            let callback = callback.clone();
            let flag = flag.clone();
            promise.on_complete(move |result| {
                if let Ok(value) = result {
                    if flag.load(Ordering::Acquire) {
                        callback(&key, value);
                    }
                }
            });
        };
        let subscriber = Subscriber {
            id,
            skip_type_tag,
            observe: Box::new(observe),
            replay: Mutex::new(Some(Vec::new())),
        };
        (subscriber, active)
    }

    /// Entries carrying the subscriber's own tag are skipped.
    pub fn wants(&self, key: &CacheKey) -> bool {
        self.skip_type_tag
            .as_deref()
            .map_or(true, |skip| skip != key.type_tag())
    }

    /// Arranges for the callback to see the entry's value once it resolves.
    /// While the subscriber is still replaying, the entry is queued behind
    /// the replay instead.
    pub fn observe(&self, key: &CacheKey, promise: &Arc<dyn ErasedPromise>) {
        if !self.wants(key) {
            return;
        }
        if let Some(queued) = self.replay.lock().as_mut() {
            queued.push((key.clone(), promise.clone()));
            return;
        }
        (self.observe)(key, &**promise)
    }

    /// Replays `existing` (oldest first), then the entries queued meanwhile,
    /// and switches to direct delivery once nothing is left in the queue.
    pub fn replay(&self, existing: &[Node]) {
        for (key, promise) in existing {
            if self.wants(key) {
                (self.observe)(key, &**promise);
            }
        }
        loop {
            let queued = {
                let mut replay = self.replay.lock();
                match replay.as_mut() {
                    Some(queued) if !queued.is_empty() => mem::take(queued),
                    _ => {
                        *replay = None;
                        break;
                    }
                }
            };
            for (key, promise) in &queued {
                (self.observe)(key, &**promise);
            }
        }
    }
}

/// Keeps a cache subscription alive; dropping it unsubscribes.
///
/// Values of entries that resolve after the drop are not delivered.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<RwLock<Vec<Arc<Subscriber>>>>,
}

impl Subscription {
    pub(super) fn new(id: u64, active: Arc<AtomicBool>, registry: &Registry) -> Self {
        Subscription {
            id,
            active,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(registry) = self.registry.upgrade() {
            registry.write().retain(|s| s.id != self.id);
        }
    }
}
