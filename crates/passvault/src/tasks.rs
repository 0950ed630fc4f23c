//! Background tasks owned by a controller

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Counts a task as running until its future is dropped
struct Running(Arc<watch::Sender<usize>>);

impl Running {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// In-flight operation tasks. Dropping the set aborts them.
pub struct TaskSet {
    set: Mutex<JoinSet<()>>,
    running: Arc<watch::Sender<usize>>,
}

impl Default for TaskSet {
    fn default() -> Self {
        Self {
            set: Mutex::new(JoinSet::new()),
            running: Arc::new(watch::Sender::new(0)),
        }
    }
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn onto the current runtime. Finished tasks are reaped first.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let running = Running::enter(&self.running);
        let mut set = self.lock();
        while set.try_join_next().is_some() {}
        set.spawn(async move {
            let _running = running;
            task.await;
        });
    }

    /// Number of tasks still running
    pub fn len(&self) -> usize {
        *self.running.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every task spawned so far (and any spawned meanwhile)
    /// has finished. The tasks stay owned by the set, so cancelling the
    /// wait leaves them running.
    pub async fn wait_idle(&self) {
        let mut running = self.running.subscribe();
        // the sender lives as long as self
        let _ = running.wait_for(|n| *n == 0).await;
    }
}

impl std::fmt::Debug for TaskSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSet").field("running", &self.len()).finish()
    }
}
