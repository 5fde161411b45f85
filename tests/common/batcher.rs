use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dataloader::BatchFn;

#[derive(Clone, Default)]
pub struct Batcher {
    invoke_cnt: Arc<AtomicUsize>,
}

impl Batcher {
    pub fn invoke_cnt(&self) -> usize {
        self.invoke_cnt.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchFn<i32, i32> for Batcher {
    type Error = ();

    async fn load(&mut self, keys: &[i32]) -> Result<Vec<Result<i32, ()>>, ()> {
        self.invoke_cnt.fetch_add(1, Ordering::SeqCst);
        Ok(keys.iter().map(|v| Ok(v * 10)).collect())
    }
}

// Result with batch call seq
#[async_trait]
impl BatchFn<i32, (usize, i32)> for Batcher {
    type Error = ();

    async fn load(&mut self, keys: &[i32]) -> Result<Vec<Result<(usize, i32), ()>>, ()> {
        let seq = self.invoke_cnt.fetch_add(1, Ordering::SeqCst);
        Ok(keys.iter().map(|v| Ok((seq + 1, v * 10))).collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MyError {
    Unknown,
}

#[derive(Clone)]
pub struct BadBatcher;

#[async_trait]
impl BatchFn<i32, i32> for BadBatcher {
    type Error = MyError;

    async fn load(&mut self, _keys: &[i32]) -> Result<Vec<Result<i32, MyError>>, MyError> {
        // fail whole batch
        Err(MyError::Unknown)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueError {
    NotEven,
}

#[async_trait]
impl BatchFn<i32, u32> for BadBatcher {
    type Error = ValueError;

    async fn load(&mut self, keys: &[i32]) -> Result<Vec<Result<u32, ValueError>>, ValueError> {
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
