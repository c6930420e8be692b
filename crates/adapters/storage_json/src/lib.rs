//! # smartish-adapter-storage-json
//!
//! JSON file adapter — implements the [`StateStore`] port.
//!
//! The file holds `{"rooms": {"<zone>": {"climate": {...}}}}`. A missing or
//! unreadable file loads as an empty snapshot; saves go through a temporary
//! file and a rename so a crash mid-write never leaves a truncated file.

pub mod error;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use smartish_app::ports::StateStore;
use smartish_domain::error::SmartishError;
use smartish_domain::snapshot::Snapshot;

pub use error::StorageError;

/// Snapshot store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temporary_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<Snapshot, SmartishError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no state file, starting fresh");
                return Ok(Snapshot::default());
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unable to read state file, starting fresh");
                return Ok(Snapshot::default());
            }
        };
        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => {
                tracing::info!(path = %self.path.display(), zones = snapshot.rooms.len(), "loaded state file");
                Ok(snapshot)
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unable to parse state file, starting fresh");
                Ok(Snapshot::default())
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SmartishError> {
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(StorageError::Serialize)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }
        let temporary = self.temporary_path();
        tokio::fs::write(&temporary, bytes)
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&temporary, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        tracing::info!(path = %self.path.display(), zones = snapshot.rooms.len(), "saved state file");
        Ok(())
    }
}
