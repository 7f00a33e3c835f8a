//! Bounded worker pool for per-user jobs.
//!
//! A loop tick that touches several users runs their jobs through the pool
//! so one slow generator or embedding call cannot stall the rest. Spawned
//! background jobs (fact extraction) share the same permit budget.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

/// Concurrency limiter shared by loop ticks and background jobs.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// A pool running at most `size` jobs at once (minimum 1).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
        }
    }

    /// Configured concurrency.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` for every item with bounded concurrency, collecting the
    /// results in completion order. Each job holds a pool permit while it
    /// runs; once the pool is closed jobs run without one.
    pub async fn run_all<I, T, F, Fut>(&self, items: I, mut job: F) -> Vec<T>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        let semaphore = &self.semaphore;
        stream::iter(items)
            .map(|item| {
                let work = job(item);
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    work.await
                }
            })
            .buffer_unordered(self.size)
            .collect()
            .await
    }

    /// Spawn `job` on the runtime once a permit is free.
    ///
    /// Resolves to `None` if the pool was closed before the job started.
    pub fn spawn<Fut>(&self, job: Fut) -> JoinHandle<Option<Fut::Output>>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                warn!("Worker pool closed, dropping job");
                return None;
            };
            Some(job.await)
        })
    }

    /// Stop handing out permits. Queued spawned jobs resolve to `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn run_all_bounds_concurrency() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = pool
            .run_all(0..12_usize, |i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i * 2
                }
            })
            .await;

        assert_eq!(results.len(), 12);
        assert_eq!(results.iter().sum::<usize>(), (0..12).map(|i| i * 2).sum::<usize>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn spawned_jobs_take_permits_from_run_all() {
        let pool = WorkerPool::new(2);
        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let held = pool.spawn(async move {
            let _ = wait.await;
        });
        while pool.available() == 2 {
            tokio::task::yield_now().await;
        }

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        pool.run_all(0..6, |_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        release.send(()).expect("job waiting");
        assert_eq!(held.await.expect("join"), Some(()));
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn spawn_runs_and_close_drops() {
        let pool = WorkerPool::new(1);
        assert_eq!(pool.spawn(async { 7 }).await.expect("join"), Some(7));

        pool.close();
        assert_eq!(pool.spawn(async { 7 }).await.expect("join"), None);
        assert_eq!(pool.size(), 1);
    }
}
