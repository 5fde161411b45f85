use async_trait::async_trait;

/// The fetch function a [`Loader`](crate::Loader) calls once per batch.
///
/// The returned vector must hold exactly one result per key, in key order:
/// result `i` belongs to `keys[i]`. An inner `Err` fails that key only; an
/// outer `Err` fails every key in the batch.
#[async_trait]
pub trait BatchFn<K, V> {
    type Error;

    async fn load(&mut self, keys: &[K]) -> Result<Vec<Result<V, Self::Error>>, Self::Error>;
}
