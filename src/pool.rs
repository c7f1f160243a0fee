//! Bounded pool for blocking OS calls.
//!
//! Jobs run on tokio's blocking threads, but at most `size` of them at once.
//! The permit moves into the job itself, so a caller that stops waiting (for
//! example when the request deadline fires) does not free a slot that is
//! still busy.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::trace;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
    #[error("blocking job failed: {0}")]
    Join(#[from] JoinError),
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// A pool of `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers not currently running a job.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a worker and wait for its result.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        trace!(idle = self.idle_workers(), "dispatching blocking job");

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });
        Ok(handle.await?)
    }
}
