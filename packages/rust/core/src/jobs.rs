//! Supervisor for detached background work (query saves, resource discovery).
//!
//! Jobs are not tied to the request that submitted them: dropping the
//! caller's future does not cancel a job. Each job runs under its own
//! deadline, and at most `max_jobs` run at once.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use mathprereq_shared::Result;

/// Tracks detached jobs so they can be drained on shutdown.
#[derive(Debug, Clone)]
pub struct BackgroundJobs {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl BackgroundJobs {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_jobs.max(1))),
        }
    }

    /// Start `job` in the background with its own `timeout`.
    ///
    /// The outcome is logged; errors and timeouts never reach the submitter.
    pub fn spawn<F>(&self, name: &'static str, timeout: Duration, job: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(job = name, "job pool closed, dropping job");
                return;
            };
            let start = Instant::now();
            debug!(job = name, "background job started");

            match tokio::time::timeout(timeout, job).await {
                Ok(Ok(())) => info!(
                    job = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "background job finished"
                ),
                Ok(Err(e)) => error!(job = name, error = %e, "background job failed"),
                Err(_) => error!(
                    job = name,
                    timeout_ms = timeout.as_millis() as u64,
                    "background job timed out"
                ),
            }
        });
    }

    /// Jobs submitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every job submitted so far.
    ///
    /// The tracker is reopened afterwards, so later submissions are accepted.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mathprereq_shared::MathPrereqError;

    #[tokio::test]
    async fn drain_waits_for_all_jobs() {
        let jobs = BackgroundJobs::new(4);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = done.clone();
            jobs.spawn("count", Duration::from_secs(5), async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        jobs.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(jobs.pending(), 0);
    }

    #[tokio::test]
    async fn failures_and_timeouts_are_contained() {
        let jobs = BackgroundJobs::new(2);
        jobs.spawn("fails", Duration::from_secs(1), async {
            Err(MathPrereqError::Network("down".into()))
        });
        jobs.spawn("hangs", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let started = Instant::now();
        jobs.drain().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn jobs_survive_dropped_submitter() {
        let jobs = BackgroundJobs::new(1);
        let done = Arc::new(AtomicUsize::new(0));
        {
            let jobs = jobs.clone();
            let done = done.clone();
            let submitter = async move {
                jobs.spawn("detached", Duration::from_secs(5), async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                std::future::pending::<()>().await;
            };
            let _ = tokio::time::timeout(Duration::from_millis(1), submitter).await;
        }
        jobs.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn accepts_jobs_after_drain() {
        let jobs = BackgroundJobs::new(1);
        jobs.drain().await;
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        jobs.spawn("late", Duration::from_secs(1), async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        jobs.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
