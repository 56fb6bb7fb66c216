//! Bounded concurrency for handler execution. Submission blocks (rather than
//! rejecting) when the pool is saturated — backpressure flows back to the
//! transport's receive loop instead of piling up in memory.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::error::{codes, StructuredError};

/// A fixed-size pool of execution slots. Cloning shares the same semaphore.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// `size` is `THREADPOOL_SIZE` from [`crate::config::ServiceConfig`];
    /// zero is rejected in favor of one, since a pool with no slots can
    /// never make progress.
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Acquire a slot (blocking the caller if saturated), run `job`, and
    /// release the slot. A panic inside `job` is caught and turned into an
    /// `ORION_PANIC` [`StructuredError`] rather than taking down the worker
    /// pool — the caller gets `Err` instead of the task aborting.
    pub async fn run<F, Fut, T>(&self, job: F) -> Result<T, StructuredError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore is never closed");
        tracing::debug!(available = self.semaphore.available_permits(), "worker acquired");

        let handle = tokio::spawn(async move {
            let _permit = permit;
            AssertUnwindSafe(job()).catch_unwind().await
        });

        match handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic)) => {
                let message = panic_message(&panic);
                tracing::error!(message, "handler panicked");
                Err(StructuredError::new(codes::ORION_PANIC).with_message(message))
            }
            Err(join_err) => {
                tracing::error!(%join_err, "worker task was cancelled or aborted");
                Err(StructuredError::new(codes::ORION_PANIC)
                    .with_message(format!("worker task did not complete: {join_err}")))
            }
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_a_job_and_returns_its_value() {
        let pool = WorkerPool::new(2);
        let result = pool.run(|| async { 40 + 2 }).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn a_panicking_job_yields_orion_panic_without_poisoning_the_pool() {
        let pool = WorkerPool::new(1);
        let err = pool
            .run(|| async { panic!("handler blew up") })
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::ORION_PANIC);
        assert!(err.message().contains("handler blew up"));

        // The pool still works after a panic.
        let result = pool.run(|| async { 7 }).await.unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn saturated_pool_makes_a_second_submission_wait() {
        let pool = WorkerPool::new(1);
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let s1 = Arc::clone(&started);
        let f1 = Arc::clone(&finished);
        let p1 = pool.clone();
        let first = tokio::spawn(async move {
            p1.run(move || async move {
                s1.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                f1.fetch_add(1, Ordering::SeqCst);
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(pool.available_permits(), 0);

        first.await.unwrap().unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
