use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::LoadError;

type Callback<V, E> = Box<dyn FnOnce(&Result<V, LoadError<E>>) + Send>;

enum State<V, E> {
    Pending {
        /// One waker per polling handle, keyed by the handle.
        wakers: HashMap<u64, Waker>,
        callbacks: Vec<Callback<V, E>>,
    },
    Resolved(V),
    Rejected(LoadError<E>),
    Cancelled,
}

/// Where a [`Promise`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

struct Inner<V, E> {
    completed: AtomicBool,
    next_waker: AtomicU64,
    state: Mutex<State<V, E>>,
}

/// A single-assignment, cancellable result for one key.
///
/// A promise starts out pending and transitions exactly once to resolved,
/// rejected or cancelled; every later completion attempt is ignored. Clones
/// share the same slot, so a promise can be awaited by any number of callers
/// and indexed by the cache at the same time.
pub struct Promise<V, E> {
    inner: Arc<Inner<V, E>>,
    /// Set once this handle has been polled while pending.
    waker_key: Option<u64>,
}

// Manual implementation is used to omit applying unnecessary Clone bounds.
impl<V, E> Clone for Promise<V, E> {
    fn clone(&self) -> Self {
        Promise {
            inner: self.inner.clone(),
            waker_key: None,
        }
    }
}

impl<V, E> Drop for Promise<V, E> {
    fn drop(&mut self) {
        // A caller that stops waiting takes its waker with it.
        if let Some(key) = self.waker_key.take() {
            if let State::Pending { wakers, .. } = &mut *self.inner.state.lock() {
                wakers.remove(&key);
            }
        }
    }
}

impl<V, E> fmt::Debug for Promise<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("status", &self.status())
            .finish()
    }
}

impl<V, E> Default for Promise<V, E> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<V, E> Promise<V, E> {
    pub fn pending() -> Self {
        Self::with_state(
            State::Pending {
                wakers: HashMap::new(),
                callbacks: Vec::new(),
            },
            false,
        )
    }

    pub fn resolved(value: V) -> Self {
        Self::with_state(State::Resolved(value), true)
    }

    pub fn rejected(error: LoadError<E>) -> Self {
        Self::with_state(State::Rejected(error), true)
    }

    fn with_state(state: State<V, E>, completed: bool) -> Self {
        Promise {
            inner: Arc::new(Inner {
                completed: AtomicBool::new(completed),
                next_waker: AtomicU64::new(0),
                state: Mutex::new(state),
            }),
            waker_key: None,
        }
    }

    pub fn status(&self) -> PromiseStatus {
        match &*self.inner.state.lock() {
            State::Pending { .. } => PromiseStatus::Pending,
            State::Resolved(_) => PromiseStatus::Resolved,
            State::Rejected(_) => PromiseStatus::Rejected,
            State::Cancelled => PromiseStatus::Cancelled,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Both handles point at the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        match &*self.inner.state.lock() {
            State::Pending { wakers, .. } => wakers.len(),
            _ => 0,
        }
    }
}

impl<V, E> Promise<V, E>
where
    V: Clone,
    E: Clone,
{
    /// Returns `false` if the promise had already completed.
    pub fn resolve(&self, value: V) -> bool {
        self.complete(State::Resolved(value))
    }

    /// Returns `false` if the promise had already completed.
    pub fn reject(&self, error: LoadError<E>) -> bool {
        self.complete(State::Rejected(error))
    }

    /// Cancels a pending promise. Cancelling a completed promise is a no-op,
    /// so this is safe to call any number of times.
    pub fn try_cancel(&self) -> bool {
        self.complete(State::Cancelled)
    }

    /// The completed result, or `None` while pending.
    pub fn result(&self) -> Option<Result<V, LoadError<E>>> {
        Self::read(&self.inner.state.lock())
    }

    /// Runs `callback` once the promise completes, or right away if it
    /// already has.
    pub fn on_complete<C>(&self, callback: C)
    where
        C: FnOnce(&Result<V, LoadError<E>>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if let State::Pending { callbacks, .. } = &mut *state {
            callbacks.push(Box::new(callback));
            return;
        }
        let result = Self::read(&state);
        drop(state);
        if let Some(result) = result {
            callback(&result);
        }
    }

    fn complete(&self, next: State<V, E>) -> bool {
        if self
            .inner
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let mut state = self.inner.state.lock();
        let previous = std::mem::replace(&mut *state, next);
        let result = Self::read(&state);
        drop(state);

        if let (State::Pending { wakers, callbacks }, Some(result)) = (previous, result) {
            wakers.into_values().for_each(Waker::wake);
            for callback in callbacks {
                callback(&result);
            }
        }
        true
    }

    fn read(state: &State<V, E>) -> Option<Result<V, LoadError<E>>> {
        match state {
            State::Pending { .. } => None,
            State::Resolved(v) => Some(Ok(v.clone())),
            State::Rejected(e) => Some(Err(e.clone())),
            State::Cancelled => Some(Err(LoadError::Cancelled)),
        }
    }
}

impl<V, E> Future for Promise<V, E>
where
    V: Clone,
    E: Clone,
{
    type Output = Result<V, LoadError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.inner.state.lock();
        if let State::Pending { wakers, .. } = &mut *state {
            let inner = &this.inner;
            let key = *this
                .waker_key
                .get_or_insert_with(|| inner.next_waker.fetch_add(1, Ordering::Relaxed));
            match wakers.get_mut(&key) {
                Some(waker) if waker.will_wake(cx.waker()) => {}
                Some(waker) => *waker = cx.waker().clone(),
                None => {
                    wakers.insert(key, cx.waker().clone());
                }
            }
            return Poll::Pending;
        }
        match Self::read(&state) {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}
