// devices/store.rs
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

use crate::models::Device;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("device store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("device store is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Durable home for the last registry snapshot.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Device>, StoreError>;
    async fn save(&self, devices: &[Device]) -> Result<(), StoreError>;
}

/// Keeps the snapshot as a JSON array in a single file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<Device>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, devices: &[Device]) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(devices)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        // Readers of the file never see a half-written list.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
