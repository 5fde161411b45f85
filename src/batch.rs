use std::collections::HashMap;
use std::hash::Hash;

use crate::pool::{ObjectPool, Reset};
use crate::promise::Promise;

pub type BatchPool<K, V, E> = ObjectPool<Batch<K, V, E>>;

/// Keys collected during one batch window, each with its own promise.
///
/// Keys keep their insertion order and appear once; asking for a key that is
/// already in the batch returns the promise created the first time.
pub struct Batch<K, V, E> {
    keys: Vec<K>,
    promises: HashMap<K, Promise<V, E>>,
}

impl<K, V, E> Default for Batch<K, V, E> {
    fn default() -> Self {
        Batch {
            keys: Vec::new(),
            promises: HashMap::new(),
        }
    }
}

impl<K, V, E> Reset for Batch<K, V, E> {
    fn reset(&mut self) {
        self.keys.clear();
        self.promises.clear();
    }
}

impl<K, V, E> Batch<K, V, E>
where
    K: Eq + Hash + Clone,
{
    /// A key whose promise was cancelled before dispatch gets a fresh
    /// promise; the batch still loads it once.
    pub fn get_or_create_promise(&mut self, key: K) -> Promise<V, E> {
        if let Some(promise) = self.promises.get(&key) {
            if !promise.is_completed() {
                return promise.clone();
            }
        }
        let promise = Promise::pending();
        if self.promises.insert(key.clone(), promise.clone()).is_none() {
            self.keys.push(key);
        }
        promise
    }

    pub fn promise(&self, key: &K) -> Option<&Promise<V, E>> {
        self.promises.get(key)
    }

    /// Keys in the order they joined the batch.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Promises in key order.
    pub fn promises(&self) -> impl Iterator<Item = (&K, &Promise<V, E>)> {
        self.keys
            .iter()
            .filter_map(move |k| self.promises.get(k).map(|p| (k, p)))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether one more distinct key fits; `0` means unbounded.
    pub fn has_room(&self, max_batch_size: usize) -> bool {
        max_batch_size == 0 || self.keys.len() < max_batch_size
    }
}
