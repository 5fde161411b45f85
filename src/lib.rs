//! A batching and memoizing DataLoader.
//!
//! A [`Loader`] collects the keys requested during one batch window, hands
//! them to a [`BatchFn`] in a single call and fans the results back out to
//! each caller's [`Promise`]. Promises are memoized in a bounded
//! [`PromiseCache`], so a key requested again is served without a fetch.
//!
//! ```no_run
//! use async_trait::async_trait;
//! use dataloader::{BatchFn, Loader};
//! use futures::executor::block_on;
//!
//! struct Users;
//!
//! #[async_trait]
//! impl BatchFn<u32, String> for Users {
//!     type Error = String;
//!
//!     async fn load(&mut self, keys: &[u32]) -> Result<Vec<Result<String, String>>, String> {
//!         Ok(keys.iter().map(|id| Ok(format!("user {}", id))).collect())
//!     }
//! }
//!
//! let loader = Loader::new(Users).with_max_batch_size(100);
//! let (a, b) = block_on(futures::future::try_join(loader.load(1), loader.load(2))).unwrap();
//! assert_eq!(("user 1".to_string(), "user 2".to_string()), (a, b));
//! ```

mod batch;
mod batch_fn;
pub mod cache;
mod diagnostics;
mod error;
mod loader;
mod options;
mod outcome;
pub mod pool;
mod promise;
mod runtime;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use batch::{Batch, BatchPool};
pub use batch_fn::BatchFn;
pub use cache::{CacheKey, CacheOwner, CachePool, PromiseCache, Subscription};
pub use diagnostics::{DiagnosticEvents, TracingDiagnostics};
pub use error::{LoadError, ScheduleError};
pub use loader::Loader;
pub use options::LoaderOptions;
pub use outcome::Outcome;
pub use promise::{Promise, PromiseStatus};
pub use scheduler::{AutoScheduler, ManualScheduler, Scheduler, SwappableScheduler};
pub use tokio_util::sync::CancellationToken;

use std::{future::Future, pin::Pin};

/// A trait alias. Read as "a function which returns a pinned box containing a future"
pub trait WaitForWorkFn:
    Fn() -> Pin<Box<dyn Future<Output = ()> + Send + Sync>> + Send + Sync + 'static
{
}

impl<T> WaitForWorkFn for T where
    T: Fn() -> Pin<Box<dyn Future<Output = ()> + Send + Sync>> + Send + Sync + 'static
{
}

pub(crate) fn yield_fn(count: usize) -> impl WaitForWorkFn {
    move || {
        Box::pin(async move {
            // yield for other load to append request
            for _ in 0..count {
                runtime::yield_now().await;
            }
        })
    }
}
