//! Bounded worker pool with per-key ordering.
//!
//! Work submitted without a key runs as soon as a worker slot is free.
//! Work submitted with an [`AffinityKey`] is appended to that key's queue,
//! which drains one job at a time in submission order. Queues are created
//! on first use and removed as soon as they run empty.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, warn};

use crate::error::TaskError;

/// Identity used to serialize related work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffinityKey {
    Guild(u64),
    Channel(u64),
    User(u64),
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to the result of submitted work.
///
/// Dropping it does not cancel the work; the result is simply discarded.
#[must_use = "dropping the handle discards the result but the work still runs"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| TaskError::Aborted))
    }
}

struct Inner {
    permits: Arc<Semaphore>,
    // Jobs are Send but not Sync; the mutex keeps the map shareable.
    queues: DashMap<AffinityKey, Mutex<VecDeque<Job>>>,
    workers: usize,
}

/// Shared executor for database and backend work.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    /// Create a pool running at most `workers` jobs at once.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        debug!("Task manager started with {} workers", workers);
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(workers)),
                queues: DashMap::new(),
                workers,
            }),
        }
    }

    /// Run `work` on the general pool, with no ordering guarantee.
    ///
    /// When all workers are busy the job waits for a free slot.
    pub fn spawn<F, T>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let permits = Arc::clone(&self.inner.permits);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let _ = tx.send(work.await);
        });

        TaskHandle { rx }
    }

    /// Run `work` after everything previously submitted for `key`.
    pub fn spawn_keyed<F, T>(&self, key: AffinityKey, work: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = tx.send(work.await);
        });

        // The push happens under the map's shard lock, the same lock the
        // drainer takes before it removes an empty queue.
        let mut created = false;
        self.inner
            .queues
            .entry(key)
            .or_insert_with(|| {
                created = true;
                Mutex::new(VecDeque::new())
            })
            .lock()
            .push_back(job);

        if created {
            tokio::spawn(drain(Arc::clone(&self.inner), key));
        }

        TaskHandle { rx }
    }

    /// Number of keys with queued or running work.
    pub fn active_queues(&self) -> usize {
        self.inner.queues.len()
    }

    /// Configured parallelism.
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Stop accepting work. Jobs not yet started are dropped and their
    /// handles resolve to [`TaskError::Aborted`].
    pub fn shutdown(&self) {
        self.inner.permits.close();
        debug!("Task manager closed");
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("workers", &self.inner.workers)
            .field("active_queues", &self.inner.queues.len())
            .finish()
    }
}

async fn drain(inner: Arc<Inner>, key: AffinityKey) {
    loop {
        let next = inner
            .queues
            .get(&key)
            .and_then(|queue| queue.lock().pop_front());

        let Some(job) = next else {
            if inner.queues.remove_if(&key, |_, queue| queue.lock().is_empty()).is_some()
                || !inner.queues.contains_key(&key)
            {
                break;
            }
            // Something was pushed between the pop and the removal attempt.
            continue;
        };

        let Ok(permit) = Arc::clone(&inner.permits).acquire_owned().await else {
            // Closed pool: drop the job, its handle reports Aborted.
            continue;
        };

        // A separate task isolates panics so the queue keeps draining.
        if let Err(err) = tokio::spawn(job).await {
            warn!(?key, error = %err, "Affinity job panicked");
        }
        drop(permit);
    }
}
