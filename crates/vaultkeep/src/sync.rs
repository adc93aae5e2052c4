//! Per-owner async locks.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Default interval between stale-entry sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Default idle age after which an unused lock entry is dropped.
pub const DEFAULT_MAX_IDLE_AGE: Duration = Duration::from_secs(7200);

/// Maps an owner key to its lock and the time it was last handed out.
type LockTable = DashMap<String, (Arc<Mutex<()>>, Instant)>;

/// Per-owner async mutex.
///
/// Work on different owners runs concurrently, work on the same owner is
/// serialized. Entries nobody references are swept once they sit idle for
/// longer than the configured age.
///
/// ```ignore
/// let locks = KeyedLocks::new();
/// let _guard = locks.lock("alice").await;
/// // a second `locks.lock("alice")` waits here, `locks.lock("bob")` does not
/// ```
#[derive(Clone, Default)]
pub struct KeyedLocks {
    table: Arc<LockTable>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for `key`, refreshing its last-access time.
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let now = Instant::now();
        self.table
            .entry(key.to_string())
            .and_modify(|(_, seen)| *seen = now)
            .or_insert_with(|| (Arc::new(Mutex::new(())), now))
            .0
            .clone()
    }

    /// Acquire the lock for `key`.
    ///
    /// The guard owns its mutex, so it can be held across `.await` and moved
    /// into spawned tasks.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.get(key).lock_owned().await
    }

    /// Drop entries idle for longer than `max_age` that nobody else holds.
    ///
    /// Returns how many entries were removed.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.table.len();
        // strong_count == 1: only the table references it, so no one holds
        // or waits on the lock.
        self.table.retain(|_, (lock, seen)| {
            Arc::strong_count(lock) > 1 || now.duration_since(*seen) <= max_age
        });
        before.saturating_sub(self.table.len())
    }

    /// Sweep stale entries on a timer until the returned handle is aborted.
    pub fn spawn_cleanup(&self, name: &'static str) -> JoinHandle<()> {
        self.spawn_cleanup_with(DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_IDLE_AGE, name)
    }

    pub fn spawn_cleanup_with(
        &self,
        interval: Duration,
        max_age: Duration,
        name: &'static str,
    ) -> JoinHandle<()> {
        let locks = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; nothing can be stale yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = locks.cleanup_stale(max_age);
                if removed > 0 {
                    debug!(
                        removed,
                        remaining = locks.len(),
                        locks = name,
                        "Cleaned up stale locks"
                    );
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
