use crate::collectors::Capture;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read snapshot file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write snapshot file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to decode snapshot file {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, capture: &Capture) -> Result<String, PersistError>;

    async fn load(&self) -> Result<Option<Capture>, PersistError>;
}

#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    // Unique per save; overlapping saves must not share a temp file.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "metrics.json".into());
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Persistence for JsonFilePersistence {
    async fn save(&self, capture: &Capture) -> Result<String, PersistError> {
        let body = serde_json::to_vec_pretty(capture).map_err(PersistError::Encode)?;
        let tmp = self.temp_path();
        if let Err(source) = tokio::fs::write(&tmp, body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PersistError::Write {
                path: tmp.display().to_string(),
                source,
            });
        }
        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PersistError::Write {
                path: self.display(),
                source,
            });
        }
        Ok(self.display())
    }

    async fn load(&self) -> Result<Option<Capture>, PersistError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistError::Read {
                    path: self.display(),
                    source,
                })
            }
        };
        let capture = serde_json::from_slice(&bytes).map_err(|source| PersistError::Decode {
            path: self.display(),
            source,
        })?;
        Ok(Some(capture))
    }
}

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    slot: Mutex<Option<Capture>>,
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn save(&self, capture: &Capture) -> Result<String, PersistError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(capture.clone());
        Ok("memory".to_string())
    }

    async fn load(&self) -> Result<Option<Capture>, PersistError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersistence;

#[async_trait]
impl Persistence for NullPersistence {
    async fn save(&self, capture: &Capture) -> Result<String, PersistError> {
        debug!(captured_at = %capture.captured_at, "snapshot discarded");
        Ok("none".to_string())
    }

    async fn load(&self) -> Result<Option<Capture>, PersistError> {
        Ok(None)
    }
}
