//! Background-after-response task primitive (spec §5, §9).
//!
//! The source schedules "after response" work (mark nudges delivered,
//! store a checkpoint, deliver a webhook, analyse a tee'd stream) on the
//! host event loop's `waitUntil`. There is no equivalent on a native
//! executor: a request handler that returns still owns its task unless
//! something keeps it alive. `BackgroundTasks` is that something — a
//! process-owned handle, not a request-owned one, so work starts by a
//! handler continues after the response has gone out.
//!
//! Grounded in the `tokio::spawn` calls inside
//! `cloudllm::mcp_http_adapter::AxumHttpAdapter::start`, generalised into
//! a registry the process can drain at shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// Owns every spawned background task so the process can await them at
/// graceful shutdown instead of abandoning in-flight analysis/delivery
/// work. Cloning is cheap — it's a handle around an `Arc`.
#[derive(Clone)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

struct Inner {
    /// Bounds concurrent background analyses so a burst of streaming
    /// requests can't spawn unbounded tee-analysis tasks.
    semaphore: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new(max_concurrent: usize) -> Self {
        BackgroundTasks {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Spawn `fut`, bounded by `timeout` and by the concurrency permit.
    /// A permit that can't be acquired immediately still queues — this is
    /// a soft cap on concurrency, not an admission-control reject; the
    /// gateway's response path never blocks on it.
    pub fn spawn<F>(&self, timeout: Duration, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.inner.semaphore.clone();
        let wrapped = async move {
            let _permit = semaphore.acquire().await;
            if tokio::time::timeout(timeout, fut).await.is_err() {
                log::warn!("background task exceeded its {:?} budget and was abandoned", timeout);
            }
        };

        let inner = self.inner.clone();
        // `JoinSet::spawn` requires `&mut self`; take the lock just long
        // enough to register the task, never across the task's own run.
        tokio::spawn(async move {
            let mut guard = inner.tasks.lock().await;
            guard.spawn(wrapped);
        });
    }

    /// Await every task spawned so far, for graceful shutdown. New tasks
    /// spawned concurrently with a drain are not guaranteed to be waited
    /// on — callers stop accepting new work before draining.
    pub async fn drain(&self) {
        let mut guard = self.inner.tasks.lock().await;
        while guard.join_next().await.is_some() {}
    }

    pub async fn outstanding(&self) -> usize {
        self.inner.tasks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn spawned_task_runs_to_completion_and_is_drained() {
        let tasks = BackgroundTasks::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        tasks.spawn(Duration::from_secs(1), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        // Give the spawn-registration hop a chance to land before draining.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        tasks.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn task_exceeding_its_budget_is_abandoned_not_panicking() {
        let tasks = BackgroundTasks::new(4);
        tasks.spawn(Duration::from_millis(10), async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        tasks.drain().await;
    }
}
