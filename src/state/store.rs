//! State store trait and the JSON document implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::StateError;
use super::types::SyncState;

/// Persistence for [`SyncState`].
///
/// Object-safe so the sync engine can hold an `Arc<dyn StateStore>`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state. A missing document yields a default state; a document
    /// that cannot be parsed is [`StateError::Corrupt`].
    async fn load(&self) -> Result<SyncState, StateError>;

    /// Replace the whole document. Either the old or the new document
    /// survives a crash, never a truncated one.
    async fn save(&self, state: &SyncState) -> Result<(), StateError>;
}

/// Human-readable JSON document on disk, written via temp file + rename.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<SyncState, StateError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No state found at {}, starting from an empty state",
                    self.path.display()
                );
                return Ok(SyncState::default());
            }
            Err(e) => return Err(StateError::io(&self.path, e)),
        };

        let state: SyncState =
            serde_json::from_str(&contents).map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        tracing::info!(
            collections = state.acquired_collections.len(),
            records = state.dispatched_records.len(),
            "Loaded state from {}",
            self.path.display()
        );
        Ok(state)
    }

    async fn save(&self, state: &SyncState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StateError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(state).map_err(StateError::Encode)?;
        let tmp = self.temp_path();

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| StateError::io(&tmp, e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| StateError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| StateError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StateError::io(&self.path, e))?;
        tracing::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

/// Exclusive advisory lock on a state document, held for the lifetime of a
/// run. Released when dropped.
#[derive(Debug)]
pub struct StateLock {
    _file: std::fs::File,
    path: PathBuf,
}

impl StateLock {
    /// Acquire the lock file next to `state_path`, failing fast if another
    /// process already holds it.
    pub async fn acquire(state_path: &Path) -> Result<Self, StateError> {
        let lock_path = state_path.with_extension("lock");
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
            }
            let file = std::fs::File::create(&lock_path)
                .map_err(|e| StateError::io(&lock_path, e))?;
            file.try_lock_exclusive().map_err(|_| StateError::Locked {
                path: lock_path.clone(),
            })?;
            Ok(Self {
                _file: file,
                path: lock_path,
            })
        })
        .await
        .map_err(|e| StateError::io(state_path, std::io::Error::other(e)))?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
