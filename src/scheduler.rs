//! Policies deciding when an accumulated batch is dispatched.
//!
//! A loader hands every new batch to its [`Scheduler`] as a [`Job`]. Keys
//! requested before the job runs join that batch; once the job runs, the
//! batch window is closed.

use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::future::BoxFuture;
use futures::StreamExt as _;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::ScheduleError;
use crate::{runtime, yield_fn, WaitForWorkFn};

/// A dispatch job: runs one batch through the batch function.
pub type Job = BoxFuture<'static, ()>;

pub trait Scheduler: Send + Sync {
    /// Accepts a job without blocking. Jobs of one scheduler start in the
    /// order they were scheduled. A refused job is dropped without running.
    fn schedule(&self, job: Job) -> Result<(), ScheduleError>;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule(&self, job: Job) -> Result<(), ScheduleError> {
        (**self).schedule(job)
    }
}

/// Runs jobs one after another on a background task.
///
/// The worker is spawned on the selected runtime the first time a job is
/// scheduled. Before each job it waits (by default, yields a few times) so
/// that keys requested in the same tick can still join the batch.
pub struct AutoScheduler {
    queue: Mutex<Option<UnboundedSender<Job>>>,
    wait_for_work: Arc<dyn WaitForWorkFn>,
}

impl Default for AutoScheduler {
    fn default() -> Self {
        Self::with_yield_count(10)
    }
}

impl AutoScheduler {
    pub fn with_yield_count(yield_count: usize) -> Self {
        Self::with_wait_for_work_fn(yield_fn(yield_count))
    }

    pub fn with_wait_for_work_fn(wait_for_work: impl WaitForWorkFn) -> Self {
        AutoScheduler {
            queue: Mutex::new(None),
            wait_for_work: Arc::new(wait_for_work),
        }
    }

    fn start_worker(&self) -> Result<UnboundedSender<Job>, ScheduleError> {
        let (sender, mut receiver) = mpsc::unbounded::<Job>();
        let wait_for_work = self.wait_for_work.clone();
        debug!("starting dispatch worker");
        runtime::spawn(async move {
            while let Some(job) = receiver.next().await {
                wait_for_work().await;
                job.await;
            }
            trace!("dispatch worker stopped");
        })?;
        Ok(sender)
    }
}

impl Scheduler for AutoScheduler {
    fn schedule(&self, job: Job) -> Result<(), ScheduleError> {
        let mut queue = self.queue.lock();
        let job = match queue.as_ref() {
            Some(sender) => match sender.unbounded_send(job) {
                Ok(()) => return Ok(()),
                Err(e) => e.into_inner(),
            },
            None => job,
        };
        let sender = self.start_worker().map_err(|e| {
            warn!("could not start dispatch worker: {}", e);
            e
        })?;
        // A freshly created channel only rejects sends if its receiver is gone.
        let _ = sender.unbounded_send(job);
        *queue = Some(sender);
        Ok(())
    }
}

/// Holds jobs until [`ManualScheduler::dispatch`] is called.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Job>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs scheduled and not yet run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs queued jobs in order until the queue is empty, including jobs
    /// scheduled while dispatching. Returns how many jobs ran.
    pub async fn dispatch(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.queue.lock().pop_front();
            match job {
                Some(job) => {
                    job.await;
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, job: Job) -> Result<(), ScheduleError> {
        self.queue.lock().push_back(job);
        Ok(())
    }
}

/// A scheduler slot whose policy can be replaced while loaders use it.
///
/// Replacing the policy only affects jobs scheduled afterwards; jobs already
/// handed to the previous policy stay with it.
pub struct SwappableScheduler {
    current: ArcSwap<Arc<dyn Scheduler>>,
}

impl Default for SwappableScheduler {
    fn default() -> Self {
        Self::new(Arc::new(AutoScheduler::default()))
    }
}

impl SwappableScheduler {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        SwappableScheduler {
            current: ArcSwap::from_pointee(scheduler),
        }
    }

    /// Installs `scheduler` and returns the policy it replaced.
    pub fn swap(&self, scheduler: Arc<dyn Scheduler>) -> Arc<dyn Scheduler> {
        let previous = self.current.swap(Arc::new(scheduler));
        (*previous).clone()
    }

    pub fn current(&self) -> Arc<dyn Scheduler> {
        (**self.current.load()).clone()
    }
}

impl Scheduler for SwappableScheduler {
    fn schedule(&self, job: Job) -> Result<(), ScheduleError> {
        self.current.load().schedule(job)
    }
}
