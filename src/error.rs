use thiserror::Error;

/// Why a load did not produce a value.
///
/// `LoadError` is `Clone` because one batch failure is handed to every
/// promise of that batch, and a cached promise may be awaited many times.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError<E> {
    /// The batch function failed for the whole batch.
    #[error("batch function failed: {0}")]
    BatchFn(E),
    /// The batch function reported an error for this key only.
    #[error("batch function failed for key: {0}")]
    Item(E),
    /// The batch function returned a different number of results than keys.
    #[error("batch function returned {values} values for {keys} keys")]
    KeyCountMismatch { keys: usize, values: usize },
    /// The promise was cancelled before it completed.
    #[error("load was cancelled")]
    Cancelled,
    /// The batch for this key could not be handed to the scheduler.
    #[error("batch could not be scheduled: {0}")]
    Unscheduled(ScheduleError),
}

/// A scheduler refused a dispatch job, e.g. because no async runtime is
/// running on the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no async runtime available to run dispatch jobs")]
pub struct ScheduleError;

impl<E> LoadError<E> {
    /// Errors that fail an entire batch and must not stay memoized.
    pub fn is_batch_error(&self) -> bool {
        matches!(
            self,
            LoadError::BatchFn(_) | LoadError::KeyCountMismatch { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }
}
