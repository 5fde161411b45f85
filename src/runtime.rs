use std::future::Future;

use crate::error::ScheduleError;

// runtime-async-std
#[cfg(feature = "runtime-async-std")]
pub type Mutex<T> = async_std::sync::Mutex<T>;

#[cfg(feature = "runtime-async-std")]
pub use async_std::task::yield_now;

#[cfg(feature = "runtime-async-std")]
pub fn spawn<F>(future: F) -> Result<(), ScheduleError>
where
    F: Future<Output = ()> + Send + 'static,
{
    async_std::task::spawn(future);
    Ok(())
}

// runtime-tokio
#[cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]
pub type Mutex<T> = tokio::sync::Mutex<T>;

#[cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]
pub use tokio::task::yield_now;

/// Fails instead of panicking when called outside a tokio runtime.
#[cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]
pub fn spawn<F>(future: F) -> Result<(), ScheduleError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| ScheduleError)?;
    handle.spawn(future);
    Ok(())
}
