use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{BatchFn, CacheKey, DiagnosticEvents, Loader, ManualScheduler};


#[derive(Clone, Debug, PartialEq)]
pub enum MyError {
    Unknown,
}

/// Multiplies keys by ten and records every batch it is called with.
#[derive(Clone, Default)]
pub struct Batcher {
    batches: Arc<Mutex<Vec<Vec<i32>>>>,
}

impl Batcher {
    pub fn batches(&self) -> Vec<Vec<i32>> {
        self.batches.lock().clone()
    }

    fn record(&self, keys: &[i32]) -> usize {
        let mut batches = self.batches.lock();
        batches.push(keys.to_vec());
        batches.len()
    }
}

#[async_trait]
impl BatchFn<i32, i32> for Batcher {
    type Error = MyError;

    async fn load(&mut self, keys: &[i32]) -> Result<Vec<Result<i32, MyError>>, MyError> {
        self.record(keys);
        Ok(keys.iter().map(|v| Ok(v * 10)).collect())
    }
}

// Result with batch call seq
#[async_trait]
impl BatchFn<i32, (usize, i32)> for Batcher {
    type Error = MyError;

    async fn load(&mut self, keys: &[i32]) -> Result<Vec<Result<(usize, i32), MyError>>, MyError> {
        let seq = self.record(keys);
        Ok(keys.iter().map(|v| Ok((seq, v * 10))).collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueError {
    NotEven,
}

/// Fails whole batches, odd keys, or the result count, depending on `V`.
#[derive(Clone, Default)]
pub struct BadBatcher {
    calls: Arc<AtomicUsize>,
}

impl BadBatcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchFn<i32, i32> for BadBatcher {
    type Error = MyError;

    async fn load(&mut self, _keys: &[i32]) -> Result<Vec<Result<i32, MyError>>, MyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // fail whole batch
        Err(MyError::Unknown)
    }
}

#[async_trait]
impl BatchFn<i32, u32> for BadBatcher {
    type Error = ValueError;

    async fn load(&mut self, keys: &[i32]) -> Result<Vec<Result<u32, ValueError>>, ValueError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keys
            .iter()
            .map(|v| {
                if v % 2 == 0 {
                    Ok(*v as u32 * 10)
                } else {
                    Err(ValueError::NotEven)
                }
            })
            .collect())
    }
}

#[async_trait]
impl BatchFn<i32, ()> for BadBatcher {
    type Error = MyError;

    async fn load(&mut self, keys: &[i32]) -> Result<Vec<Result<(), MyError>>, MyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // always return less values compared to request keys
        Ok(keys.iter().skip(1).map(|_| Ok(())).collect())
    }
}

#[async_trait]
impl BatchFn<i32, u8> for BadBatcher {
    type Error = MyError;

    async fn load(&mut self, keys: &[i32]) -> Result<Vec<Result<u8, MyError>>, MyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // always return more values compared to request keys
        Ok(keys.iter().chain(keys.iter()).map(|_| Ok(0)).collect())
    }
}

/// Collects diagnostic events as strings.
#[derive(Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl DiagnosticEvents for RecordingDiagnostics {
    fn resolved_from_cache(&self, key: &CacheKey) {
        self.events.lock().push(format!("hit {:?}", key));
    }

    fn batch_started(&self, _type_tag: &str, keys: &[&dyn Debug]) {
        self.events.lock().push(format!("start {:?}", keys));
    }

    fn batch_error(&self, _type_tag: &str, keys: &[&dyn Debug], error: &dyn Debug) {
        self.events
            .lock()
            .push(format!("batch error {:?} {:?}", keys, error));
    }

    fn item_error(&self, _type_tag: &str, key: &dyn Debug, error: &dyn Debug) {
        self.events
            .lock()
            .push(format!("item error {:?} {:?}", key, error));
    }

    fn batch_finished(&self, _type_tag: &str, keys: &[&dyn Debug], failed: usize) {
        self.events
            .lock()
            .push(format!("finish {:?} failed={}", keys, failed));
    }
}

/// A loader whose batches only dispatch when the returned scheduler says so.
pub fn manual<V, F>(load_fn: F) -> (Loader<i32, V, F>, Arc<ManualScheduler>)
where
    V: Clone + Send + Sync + 'static,
    F: BatchFn<i32, V> + Send + 'static,
    F::Error: Clone + Debug + Send + Sync + 'static,
{
    let scheduler = Arc::new(ManualScheduler::new());
    let loader = Loader::new(load_fn).with_scheduler(scheduler.clone());
    (loader, scheduler)
}
