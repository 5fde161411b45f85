#![cfg(feature = "runtime-async-std")]

mod common;

use dataloader::{LoadError, Loader, LoaderOptions};
use futures::executor::block_on;
use futures::future::{try_join, TryFutureExt};

use common::{BadBatcher, Batcher, MyError, ValueError};

fn batcher_loader() -> Loader<i32, i32, Batcher> {
    let options = LoaderOptions {
        max_batch_size: 2,
        ..LoaderOptions::default()
    };
    Loader::with_options(Batcher::default(), options)
}

#[test]
fn smoke() {
    let loader = batcher_loader();
    let v1 = loader.load(1);
    let v2 = loader.load(2);
    let v3 = loader.load(3);
    assert_eq!((10, 20), block_on(try_join(v1, v2)).unwrap());
    assert_eq!(30, block_on(v3).unwrap());

    let many = loader.load_many(vec![10, 20, 30]);
    assert_eq!(vec![100, 200, 300], block_on(many).unwrap());

    let loader_ref = &loader;
    {
        let v1 = loader_ref.load(1);
        let v2 = loader_ref.load(2);
        assert_eq!((10, 20), block_on(try_join(v1, v2)).unwrap());
    }
    {
        let v1 = loader_ref.load(3).and_then(|v| loader_ref.load(v));
        let v2 = loader_ref.load(4).and_then(|v| loader_ref.load(v));
        assert_eq!((300, 400), block_on(try_join(v1, v2)).unwrap());
    }
}

#[test]
fn nested_load() {
    let loader = batcher_loader();
    let v1 = loader.load(3).and_then(|v| loader.load(v));
    let v2 = loader.load(4).and_then(|v| loader.load(v));
    assert_eq!((300, 400), block_on(try_join(v1, v2)).unwrap());
}

#[test]
fn nested_load_many() {
    let loader = batcher_loader();
    let v1 = loader
        .load(3)
        .and_then(|v| loader.load_many(vec![v, v + 1, v + 2]));
    let v2 = loader
        .load(4)
        .and_then(|v| loader.load_many(vec![v, v + 1, v + 2]));
    let expected = (vec![300, 310, 320], vec![400, 410, 420]);
    assert_eq!(expected, block_on(try_join(v1, v2)).unwrap());
}

#[test]
fn cached_load_does_not_refetch() {
    let batcher = Batcher::default();
    let loader = Loader::<i32, (usize, i32), _>::new(batcher.clone());
    assert_eq!(Ok((1, 10)), block_on(loader.load(1)));
    assert_eq!(Ok((1, 10)), block_on(loader.load(1)));
    assert_eq!(1, batcher.invoke_cnt());

    loader.clear();
    assert_eq!(Ok((2, 10)), block_on(loader.load(1)));
}

#[test]
fn test_batch_fn_error() {
    let loader = Loader::<i32, i32, _>::new(BadBatcher);
    let v1 = block_on(loader.load(1));
    assert_eq!(LoadError::BatchFn(MyError::Unknown), v1.err().unwrap());
}

#[test]
fn test_result_val() {
    let loader = Loader::<i32, u32, _>::new(BadBatcher);
    let v1 = block_on(loader.try_load_many(vec![1, 2]));
    assert_eq!(vec![Err(LoadError::Item(ValueError::NotEven)), Ok(20)], v1);
}
