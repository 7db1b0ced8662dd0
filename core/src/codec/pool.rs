// Bounded worker pool for CPU-heavy codec jobs
//
// Jobs run on tokio's blocking threads; a semaphore caps how many run at
// once so a burst of large messages cannot occupy every blocking thread.

use super::CodecError;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Pool allowing `size` concurrent jobs (at least one)
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

    /// Run `job` off the async scheduler and wait for its result.
    pub async fn run<F, T>(&self, job: F) -> Result<T, CodecError>
    where
        F: FnOnce() -> Result<T, CodecError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CodecError::Worker(e.to_string()))?;

        let handle = tokio::task::spawn_blocking(move || {
            let result = job();
            drop(permit);
            result
        });

        handle
            .await
            .map_err(|e| CodecError::Worker(format!("codec job failed: {}", e)))?
    }
}
