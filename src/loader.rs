use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{self, Either};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::batch::{Batch, BatchPool};
use crate::cache::{CacheKey, PromiseCache};
use crate::diagnostics::{DiagnosticEvents, TracingDiagnostics};
use crate::error::LoadError;
use crate::options::LoaderOptions;
use crate::outcome::{self, Outcome};
use crate::promise::Promise;
use crate::runtime;
use crate::scheduler::{AutoScheduler, Scheduler};
use crate::BatchFn;

type BatchId = u64;

struct State<K, V, E> {
    current: Option<BatchId>,
    batches: HashMap<BatchId, Batch<K, V, E>>,
    id_seq: BatchId,
}

impl<K, V, E> State<K, V, E> {
    fn new() -> Self {
        State {
            current: None,
            batches: HashMap::new(),
            id_seq: 0,
        }
    }

    fn next_batch_id(&mut self) -> BatchId {
        self.id_seq = self.id_seq.wrapping_add(1);
        self.id_seq
    }
}

/// Batches and memoizes loads by key.
///
/// Keys requested while a batch window is open are collected into one batch
/// and handed to the batch function together once the scheduler runs the
/// batch. With caching on, each key's promise is memoized, so a key is only
/// fetched again after it was removed, evicted or its batch failed.
///
/// Clones share batches, the batch function and the cache.
pub struct Loader<K, V, F>
where
    F: BatchFn<K, V>,
{
    state: Arc<Mutex<State<K, V, F::Error>>>,
    load_fn: Arc<runtime::Mutex<F>>,
    pool: Arc<BatchPool<K, V, F::Error>>,
    scheduler: Arc<dyn Scheduler>,
    cache: Option<Arc<PromiseCache>>,
    max_batch_size: usize,
    type_tag: Arc<str>,
    diagnostics: Arc<dyn DiagnosticEvents>,
}

// Manual implementation is used to omit applying unnecessary Clone bounds.
impl<K, V, F> Clone for Loader<K, V, F>
where
    F: BatchFn<K, V>,
{
    fn clone(&self) -> Self {
        Loader {
            state: self.state.clone(),
            load_fn: self.load_fn.clone(),
            pool: self.pool.clone(),
            scheduler: self.scheduler.clone(),
            cache: self.cache.clone(),
            max_batch_size: self.max_batch_size,
            type_tag: self.type_tag.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl<K, V, F> Loader<K, V, F>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFn<K, V> + Send + 'static,
    F::Error: Clone + Debug + Send + Sync + 'static,
{
    pub fn new(load_fn: F) -> Self {
        Self::with_options(load_fn, LoaderOptions::default())
    }

    pub fn with_options(load_fn: F, options: LoaderOptions) -> Self {
        let type_tag: Arc<str> = match options.type_tag {
            Some(tag) => {
                assert!(!tag.is_empty(), "loader type tag must not be empty");
                tag.into()
            }
            None => std::any::type_name::<F>().into(),
        };
        let cache = options.caching.then(|| {
            Arc::new(PromiseCache::with_touch_threshold(
                options.cache_size,
                options.touch_threshold,
            ))
        });
        Loader {
            state: Arc::new(Mutex::new(State::new())),
            load_fn: Arc::new(runtime::Mutex::new(load_fn)),
            pool: Arc::new(BatchPool::default()),
            scheduler: Arc::new(AutoScheduler::default()),
            cache,
            max_batch_size: options.max_batch_size,
            type_tag,
            diagnostics: options
                .diagnostics
                .unwrap_or_else(|| Arc::new(TracingDiagnostics) as Arc<dyn DiagnosticEvents>),
        }
    }

    /// Most distinct keys per batch; `0` means unbounded.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Uses an [`AutoScheduler`] that yields `yield_count` times before each
    /// dispatch, giving other loads that long to join the batch.
    pub fn with_yield_count(mut self, yield_count: usize) -> Self {
        self.scheduler = Arc::new(AutoScheduler::with_yield_count(yield_count));
        self
    }

    /// Schedules dispatches with `scheduler`. It must not run a job before
    /// `schedule` returns.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Memoizes into `cache`, which other loaders may share.
    pub fn with_cache(mut self, cache: Arc<PromiseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Turns memoization off; every load goes into a batch.
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// # Panics
    ///
    /// Panics if `type_tag` is empty.
    pub fn with_type_tag(mut self, type_tag: impl Into<Arc<str>>) -> Self {
        let type_tag = type_tag.into();
        assert!(!type_tag.is_empty(), "loader type tag must not be empty");
        self.type_tag = type_tag;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticEvents>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn cache(&self) -> Option<&Arc<PromiseCache>> {
        self.cache.as_ref()
    }

    fn cache_key(&self, key: K) -> CacheKey {
        CacheKey::new(self.type_tag.clone(), key)
    }

    /// Requests `key` and returns its promise right away.
    ///
    /// The key is registered before this returns, so keys requested one
    /// after another share a batch as long as it has not been dispatched.
    pub fn load(&self, key: K) -> Promise<V, F::Error> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return self.get_or_create_promise_from_batch(key).0,
        };
        let cache_key = self.cache_key(key.clone());
        let mut scheduled = true;
        let (promise, cached) = cache.get_or_add(cache_key.clone(), |_| {
            let (promise, ok) = self.get_or_create_promise_from_batch(key);
            scheduled = ok;
            promise
        });
        if cached {
            self.diagnostics.resolved_from_cache(&cache_key);
        } else if !scheduled {
            cache.try_remove_promise(&cache_key, &promise);
        }
        promise
    }

    /// Loads `key`, giving up with [`LoadError::Cancelled`] once `cancel`
    /// fires. Cancelling only stops this caller from waiting; other callers
    /// of the same key still get the value.
    pub async fn load_async(
        &self,
        key: K,
        cancel: &CancellationToken,
    ) -> Result<V, LoadError<F::Error>> {
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        until_cancelled(self.load(key), cancel).await
    }

    /// Loads every key, returning values in key order or the first error.
    pub fn load_many(
        &self,
        keys: Vec<K>,
    ) -> impl Future<Output = Result<Vec<V>, LoadError<F::Error>>> {
        let promises = keys.into_iter().map(|k| self.load(k)).collect::<Vec<_>>();
        future::try_join_all(promises)
    }

    /// Like [`load_many`](Self::load_many), checking `cancel` before each key
    /// is requested and while waiting.
    pub async fn load_many_async(
        &self,
        keys: Vec<K>,
        cancel: &CancellationToken,
    ) -> Result<Vec<V>, LoadError<F::Error>> {
        let mut promises = Vec::with_capacity(keys.len());
        for key in keys {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }
            promises.push(self.load(key));
        }
        until_cancelled(future::try_join_all(promises), cancel).await
    }

    /// Loads every key, returning each key's own result in key order.
    pub fn try_load_many(
        &self,
        keys: Vec<K>,
    ) -> impl Future<Output = Vec<Result<V, LoadError<F::Error>>>> {
        let promises = keys.into_iter().map(|k| self.load(k)).collect::<Vec<_>>();
        future::join_all(promises)
    }

    /// Forgets the cached promise for `key`; the next load fetches it again.
    pub fn remove(&self, key: &K) -> bool {
        match &self.cache {
            Some(cache) => cache.try_remove(&self.cache_key(key.clone())),
            None => false,
        }
    }

    /// Caches `value` for `key` unless the key is already cached.
    pub fn prime(&self, key: K, value: V) -> bool {
        self.set(key, Promise::resolved(value))
    }

    /// Caches `promise` for `key` unless the key is already cached, so loads
    /// of `key` wait for it instead of fetching.
    pub fn set(&self, key: K, promise: Promise<V, F::Error>) -> bool {
        match &self.cache {
            Some(cache) => cache.try_add(self.cache_key(key), promise),
            None => false,
        }
    }

    /// Empties the cache, cancelling promises that are still pending.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// The flag is `false` when a new batch was needed and the scheduler
    /// refused it; the promise is then already rejected.
    fn get_or_create_promise_from_batch(&self, key: K) -> (Promise<V, F::Error>, bool) {
        let mut state = self.state.lock();

        if let Some(id) = state.current {
            if let Some(batch) = state.batches.get_mut(&id) {
                if batch.has_room(self.max_batch_size) || batch.promise(&key).is_some() {
                    return (batch.get_or_create_promise(key), true);
                }
            }
        }

        // Scheduled before the batch becomes current and before the lock is
        // released: a current batch is always already scheduled, and the job
        // cannot take the batch out of the state before it is inserted.
        let id = state.next_batch_id();
        if let Err(e) = self.scheduler.schedule(Box::pin(self.clone().dispatch(id))) {
            drop(state);
            warn!(type_tag = %self.type_tag, error = %e, "could not schedule batch");
            return (Promise::rejected(LoadError::Unscheduled(e)), false);
        }

        let mut batch = self.pool.get();
        let promise = batch.get_or_create_promise(key);
        state.batches.insert(id, batch);
        state.current = Some(id);
        debug!(type_tag = %self.type_tag, batch = id, "created batch");
        (promise, true)
    }

    async fn dispatch(self, id: BatchId) {
        let batch = {
            let mut state = self.state.lock();
            if state.current == Some(id) {
                state.current = None;
            }
            state.batches.remove(&id)
        };
        let batch = match batch {
            Some(batch) => batch,
            None => return,
        };

        self.diagnostics
            .batch_started(&self.type_tag, &debug_keys(batch.keys()));

        let result = {
            let mut load_fn = self.load_fn.lock().await;
            load_fn.load(batch.keys()).await
        };

        let failed = match result {
            Ok(values) => match outcome::buffer(batch.len(), values) {
                Ok(buffer) => self.complete(&batch, buffer),
                Err(values) => self.fail(
                    &batch,
                    LoadError::KeyCountMismatch {
                        keys: batch.len(),
                        values,
                    },
                ),
            },
            Err(e) => self.fail(&batch, LoadError::BatchFn(e)),
        };

        // Observers are done with the batch before it goes back to the pool.
        self.diagnostics
            .batch_finished(&self.type_tag, &debug_keys(batch.keys()), failed);
        self.pool.put(batch);
    }

    /// Hands each key its result. Returns how many keys were rejected.
    fn complete(
        &self,
        batch: &Batch<K, V, F::Error>,
        buffer: Vec<Outcome<V, F::Error>>,
    ) -> usize {
        if let Some(values) = buffer.iter().position(Outcome::is_undefined) {
            return self.fail(
                batch,
                LoadError::KeyCountMismatch {
                    keys: batch.len(),
                    values,
                },
            );
        }

        let mut failed = 0;
        for ((key, promise), outcome) in batch.promises().zip(buffer) {
            if let Outcome::Error(e) = &outcome {
                self.diagnostics.item_error(&self.type_tag, key, e);
                failed += 1;
            }
            match outcome.into_result() {
                Some(Ok(value)) => promise.resolve(value),
                Some(Err(error)) => promise.reject(error),
                None => false,
            };
        }
        failed
    }

    /// Rejects every key of the batch with `error` and drops their promises
    /// from the cache so the keys can be fetched again.
    fn fail(&self, batch: &Batch<K, V, F::Error>, error: LoadError<F::Error>) -> usize {
        if let LoadError::KeyCountMismatch { keys, values } = &error {
            warn!(
                type_tag = %self.type_tag,
                keys,
                values,
                "batch function returned the wrong number of results"
            );
        }
        self.diagnostics
            .batch_error(&self.type_tag, &debug_keys(batch.keys()), &error);

        for (key, promise) in batch.promises() {
            promise.reject(error.clone());
            if let Some(cache) = &self.cache {
                cache.try_remove_promise(&self.cache_key(key.clone()), promise);
            }
        }
        batch.len()
    }
}

fn debug_keys<K: Debug>(keys: &[K]) -> Vec<&dyn Debug> {
    keys.iter().map(|k| k as &dyn Debug).collect()
}

async fn until_cancelled<T, E, Fut>(
    waiting: Fut,
    cancel: &CancellationToken,
) -> Result<T, LoadError<E>>
where
    Fut: Future<Output = Result<T, LoadError<E>>>,
{
    let cancelled = cancel.cancelled();
    futures::pin_mut!(waiting, cancelled);
    match future::select(waiting, cancelled).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => Err(LoadError::Cancelled),
    }
}
