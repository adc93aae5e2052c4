//! Tracked background saves.
//!
//! Saves spawned off the session path are registered here so shutdown can
//! wait for them before the backend is released.

// std::sync::Mutex: never held across an .await.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

// ============================================================================
// BackgroundTasks
// ============================================================================

/// Registry of spawned tasks that must finish before shutdown completes.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        // A panic while holding the guard leaves the Vec itself consistent.
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn a task and register its handle before returning.
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);

        let mut handles = self.handles();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait until every registered task has finished, including tasks that
    /// were registered while waiting.
    ///
    /// Returns how many tasks were awaited.
    pub async fn drain(&self) -> usize {
        let mut awaited = 0;
        loop {
            let batch: Vec<_> = std::mem::take(&mut *self.handles());
            if batch.is_empty() {
                return awaited;
            }
            for handle in batch {
                awaited += 1;
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background task failed");
                }
            }
        }
    }

    /// Drain with a deadline. Tasks still running after `grace` are aborted.
    ///
    /// Returns `true` if everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let pending = self.pending_count();
        if pending == 0 {
            return true;
        }

        info!(count = pending, "Waiting for background saves to complete");

        let deadline = Instant::now() + grace;
        let mut awaited = 0;
        loop {
            let batch: Vec<_> = std::mem::take(&mut *self.handles());
            if batch.is_empty() {
                info!(count = awaited, "All background saves completed");
                return true;
            }

            let mut batch = batch.into_iter();
            while let Some(mut handle) = batch.next() {
                match tokio::time::timeout_at(deadline, &mut handle).await {
                    Ok(Ok(())) => awaited += 1,
                    Ok(Err(e)) => {
                        awaited += 1;
                        warn!(error = %e, "Background task failed");
                    }
                    Err(_) => {
                        handle.abort();
                        let mut aborted = 1;
                        let rest: Vec<_> = std::mem::take(&mut *self.handles());
                        for straggler in batch.by_ref().chain(rest) {
                            straggler.abort();
                            aborted += 1;
                        }
                        warn!(
                            count = aborted,
                            grace_secs = grace.as_secs_f64(),
                            "Background saves did not finish in time, aborted"
                        );
                        return false;
                    }
                }
            }
        }
    }

    /// Number of registered tasks that haven't finished yet.
    pub fn pending_count(&self) -> usize {
        let mut handles = self.handles();
        handles.retain(|h| !h.is_finished());
        handles.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn drain_waits_for_all_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks = BackgroundTasks::new();

        for delay in [10, 20] {
            let c = counter.clone();
            tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                c.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(tasks.drain().await, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(tasks.pending_count(), 0);
    }

    #[tokio::test]
    async fn drain_picks_up_tasks_spawned_while_draining() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks = BackgroundTasks::new();

        let inner_tasks = tasks.clone();
        let c = counter.clone();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let c2 = c.clone();
            inner_tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                c2.fetch_add(1, Ordering::SeqCst);
            });
            c.fetch_add(1, Ordering::SeqCst);
        });

        tasks.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_empty_is_noop() {
        let tasks = BackgroundTasks::new();
        assert!(tasks.shutdown(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_stragglers_after_grace() {
        let tasks = BackgroundTasks::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert!(!tasks.shutdown(Duration::from_secs(1)).await);
        assert_eq!(tasks.pending_count(), 0);
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_drain() {
        let tasks = BackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));

        tasks.spawn(async { panic!("boom") });
        let c = counter.clone();
        tasks.spawn(async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(tasks.drain().await, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
