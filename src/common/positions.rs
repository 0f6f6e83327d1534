//! Mints currently held by the copy-trading wallet, persisted as a JSON
//! array of base58 addresses.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access positions file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("positions file {path} is not a JSON array of addresses: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Pubkey>, StoreError>;

    async fn save(&self, positions: &[Pubkey]) -> Result<(), StoreError>;

    /// Drops `sold` from the stored positions and returns what is left.
    async fn remove(&self, sold: &[Pubkey]) -> Result<Vec<Pubkey>, StoreError>;
}

pub struct JsonFilePositionStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFilePositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read(&self) -> Result<Vec<Pubkey>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no positions file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<String> = serde_json::from_str(&raw).map_err(|source| StoreError::Format {
            path: self.path.clone(),
            source,
        })?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| match Pubkey::from_str(&entry) {
                Ok(mint) => Some(mint),
                Err(_) => {
                    warn!(%entry, "ignoring invalid mint in positions file");
                    None
                }
            })
            .collect())
    }

    async fn write(&self, positions: &[Pubkey]) -> Result<(), StoreError> {
        let entries: Vec<String> = positions.iter().map(Pubkey::to_string).collect();
        let raw = serde_json::to_string_pretty(&entries).map_err(|source| StoreError::Format {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl PositionStore for JsonFilePositionStore {
    async fn load(&self) -> Result<Vec<Pubkey>, StoreError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn save(&self, positions: &[Pubkey]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write(positions).await
    }

    async fn remove(&self, sold: &[Pubkey]) -> Result<Vec<Pubkey>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut positions = self.read().await?;
        positions.retain(|mint| !sold.contains(mint));
        self.write(&positions).await?;
        Ok(positions)
    }
}
