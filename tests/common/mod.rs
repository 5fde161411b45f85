#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dataloader::BatchFn;

mod batcher;

pub use batcher::{BadBatcher, Batcher, MyError, ValueError};

/// Echoes keys back and remembers what it was asked for.
#[derive(Clone, Default)]
pub struct LoadFnWithHistory {
    loaded_keys: Arc<Mutex<HashSet<usize>>>,
    reloaded_keys: Arc<Mutex<Vec<usize>>>,
    max_batch_loaded: Arc<Mutex<usize>>,
}

impl LoadFnWithHistory {
    pub fn max_batch_loaded(&self) -> usize {
        *self.max_batch_loaded.lock().unwrap()
    }

    /// Keys requested more than once.
    pub fn reloaded_keys(&self) -> Vec<usize> {
        self.reloaded_keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchFn<usize, usize> for LoadFnWithHistory {
    type Error = ();

    async fn load(&mut self, keys: &[usize]) -> Result<Vec<Result<usize, ()>>, ()> {
        let mut loaded_keys = self.loaded_keys.lock().unwrap();
        let mut max_batch_loaded = self.max_batch_loaded.lock().unwrap();
        if keys.len() > *max_batch_loaded {
            *max_batch_loaded = keys.len();
        }
        for k in keys {
            if !loaded_keys.insert(*k) {
                self.reloaded_keys.lock().unwrap().push(*k);
            }
        }
        Ok(keys.iter().map(|v| Ok(*v)).collect())
    }
}

/// Never returns anything.
#[derive(Clone)]
pub struct LoadFnForEmptyTest;

#[async_trait]
impl BatchFn<usize, usize> for LoadFnForEmptyTest {
    type Error = ();

    async fn load(&mut self, _keys: &[usize]) -> Result<Vec<Result<usize, ()>>, ()> {
        Ok(Vec::new())
    }
}
