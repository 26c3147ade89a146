use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Runs detached, delayed background tasks
///
/// Every task is tracked so that shutdown can wait for pending second
/// deletes. The returned handle can abort a task; nothing in this crate does.
#[derive(Clone, Default)]
pub struct Scheduler {
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once `delay` has elapsed, without blocking the caller
    pub fn defer<F>(&self, delay: Duration, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        })
    }

    /// Number of deferred tasks that have not finished yet
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Close the tracker and wait for every outstanding task
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Deferred cache tasks drained");
    }
}
