//! File-based vault storage implementation.
//!
//! Directory structure:
//! ```text
//! {data_dir}/
//!   {owner}.json            # Current record, replaced atomically
//!   {owner}.json.corrupt    # First undecodable copy, kept for manual recovery
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{info, warn};

use crate::model::{self, RecordDefaults, VaultRecord};
use crate::store::error::{StorageError, StorageResult};
use crate::store::vault::VaultBackend;

const RECORD_EXTENSION: &str = "json";

/// File-based implementation of `VaultBackend`.
///
/// Each owner's record lives in its own JSON document under `data_dir`.
#[derive(Debug, Clone)]
pub struct FileVaultStore {
    data_dir: PathBuf,
}

impl FileVaultStore {
    /// Create a new file vault store.
    ///
    /// The directory is created by `initialize()` or on the first save.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Get the record path for an owner, rejecting keys that would escape the
    /// data directory or collide with temp files.
    fn record_path(&self, owner: &str) -> StorageResult<PathBuf> {
        if !is_valid_owner_key(owner) {
            return Err(StorageError::invalid_key(owner));
        }
        Ok(self.data_dir.join(format!("{owner}.{RECORD_EXTENSION}")))
    }

    fn sibling(path: &std::path::Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    async fn ensure_data_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StorageError::file_io(&self.data_dir, e))
    }

    /// Copy undecodable bytes aside once so a later save can't destroy them.
    async fn preserve_corrupt(&self, path: &std::path::Path, contents: &[u8]) {
        let backup = Self::sibling(path, ".corrupt");
        match fs::try_exists(&backup).await {
            Ok(true) => {}
            Ok(false) => match fs::write(&backup, contents).await {
                Ok(()) => warn!(backup = %backup.display(), "Preserved undecodable vault record"),
                Err(e) => {
                    warn!(backup = %backup.display(), error = %e, "Failed to preserve undecodable vault record")
                }
            },
            Err(e) => warn!(backup = %backup.display(), error = %e, "Failed to check for preserved record"),
        }
    }
}

/// Owner keys become file names: ASCII alphanumerics, `-`, `_` and `.`, not
/// starting with a dot.
pub fn is_valid_owner_key(owner: &str) -> bool {
    !owner.is_empty()
        && !owner.starts_with('.')
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[async_trait]
impl VaultBackend for FileVaultStore {
    async fn initialize(&self) -> StorageResult<()> {
        if !fs::try_exists(&self.data_dir).await.unwrap_or(false) {
            self.ensure_data_dir().await?;
            info!(path = %self.data_dir.display(), "Created vault data directory");
        }
        Ok(())
    }

    async fn read(
        &self,
        owner: &str,
        defaults: &RecordDefaults,
    ) -> StorageResult<Option<VaultRecord>> {
        let path = self.record_path(owner)?;

        let contents = match fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        match model::deserialize(&contents, defaults) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                self.preserve_corrupt(&path, &contents).await;
                Err(StorageError::file_deserialization(&path, e.to_string()))
            }
        }
    }

    async fn save(&self, record: &VaultRecord) -> StorageResult<()> {
        let final_path = self.record_path(record.owner())?;
        self.ensure_data_dir().await?;

        let temp_path = Self::sibling(&final_path, ".tmp");
        let bytes =
            model::serialize(record).map_err(|e| StorageError::serialization(e.to_string()))?;

        // Write to temp file first
        fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| StorageError::file_io(&temp_path, e))?;

        // Atomic rename
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| StorageError::file_io(&final_path, e))?;

        Ok(())
    }

    async fn delete(&self, owner: &str) -> StorageResult<()> {
        let path = self.record_path(owner)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }

    async fn exists(&self, owner: &str) -> StorageResult<bool> {
        let path = self.record_path(owner)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::file_io(&path, e))
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut owners = Vec::new();

        let mut entries = match fs::read_dir(&self.data_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&self.data_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::file_io(&self.data_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str());
            if let Some(stem) = stem.filter(|s| is_valid_owner_key(s)) {
                owners.push(stem.to_string());
            }
        }

        owners.sort();
        Ok(owners)
    }
}
