#![cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dataloader::{CachePool, CancellationToken, LoadError, Loader, ScheduleError};

use common::{Batcher, LoadFnWithHistory};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batches_concurrent_loads() {
    let load_fn = LoadFnWithHistory::default();
    let loader = Loader::new(load_fn.clone()).with_max_batch_size(4);

    let l1 = loader.clone();
    let t1 = tokio::spawn(async move { l1.load_many(vec![1, 2, 3, 4, 5]).await });
    let l2 = loader.clone();
    let t2 = tokio::spawn(async move { l2.load_many(vec![4, 5, 6, 7]).await });

    assert_eq!(Ok(vec![1, 2, 3, 4, 5]), t1.await.unwrap());
    assert_eq!(Ok(vec![4, 5, 6, 7]), t2.await.unwrap());
    assert!(load_fn.max_batch_loaded() <= 4);
    assert_eq!(Vec::<usize>::new(), load_fn.reloaded_keys());
}

#[tokio::test]
async fn nested_loads() {
    let loader = Loader::<i32, i32, _>::new(Batcher::default());
    let v = loader.load(3).await.unwrap();
    assert_eq!(300, loader.load(v).await.unwrap());
}

#[tokio::test]
async fn scope_cancels_request_loads() {
    let pool = Arc::new(CachePool::new(16));
    let owner = pool.rent();
    let loader = Loader::<i32, i32, _>::new(Batcher::default())
        .with_type_tag("request")
        .with_cache(owner.cache().clone());

    assert_eq!(Ok(10), loader.load_async(1, owner.scope()).await);

    let token: CancellationToken = owner.scope().clone();
    drop(owner);
    assert_eq!(Err(LoadError::Cancelled), loader.load_async(2, &token).await);
    // the loader still holds the cache
    assert_eq!(0, pool.available());
}

#[tokio::test]
async fn load_outside_runtime_does_not_wedge_the_loader() {
    let loader = Loader::<i32, i32, _>::new(Batcher::default());

    let outside = loader.clone();
    let refused = thread::spawn(move || outside.load(1).result())
        .join()
        .unwrap();
    assert_eq!(Some(Err(LoadError::Unscheduled(ScheduleError))), refused);

    let loaded = tokio::time::timeout(Duration::from_secs(2), loader.load_many(vec![1, 2]))
        .await
        .expect("loader hung on a batch that was never scheduled");
    assert_eq!(Ok(vec![10, 20]), loaded);
}
