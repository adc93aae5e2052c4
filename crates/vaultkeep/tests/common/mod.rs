//! Common test utilities.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use vaultkeep::model::{RecordDefaults, VaultRecord};
use vaultkeep::store::{FileVaultStore, StorageError, StorageResult, VaultBackend};

/// File store wrapper that counts backend calls and can be told to fail saves
/// or slow down reads.
pub struct CountingBackend {
    inner: FileVaultStore,
    reads: AtomicUsize,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
    read_delay: Duration,
}

impl CountingBackend {
    pub fn new(dir: &Path) -> Self {
        Self::with_read_delay(dir, Duration::ZERO)
    }

    pub fn with_read_delay(dir: &Path, read_delay: Duration) -> Self {
        Self {
            inner: FileVaultStore::new(dir),
            reads: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            fail_saves: AtomicBool::new(false),
            read_delay,
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &FileVaultStore {
        &self.inner
    }
}

#[async_trait]
impl VaultBackend for CountingBackend {
    async fn initialize(&self) -> StorageResult<()> {
        self.inner.initialize().await
    }

    async fn read(
        &self,
        owner: &str,
        defaults: &RecordDefaults,
    ) -> StorageResult<Option<VaultRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        self.inner.read(owner, defaults).await
    }

    async fn save(&self, record: &VaultRecord) -> StorageResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::file_io(
                "simulated",
                std::io::Error::other("simulated failure"),
            ));
        }
        self.inner.save(record).await
    }

    async fn delete(&self, owner: &str) -> StorageResult<()> {
        self.inner.delete(owner).await
    }

    async fn exists(&self, owner: &str) -> StorageResult<bool> {
        self.inner.exists(owner).await
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        self.inner.list().await
    }
}

/// Read what is on disk for `owner`, bypassing every cache.
pub async fn stored_record(dir: &Path, owner: &str) -> Option<VaultRecord> {
    FileVaultStore::new(dir)
        .read(owner, &RecordDefaults::new(owner, 54))
        .await
        .unwrap()
}
