//! Persistent storage for settings and the known-device list
//!
//! The store is deliberately small: one settings record and one device
//! list, each a whole JSON document rewritten on every save. Consumers hold
//! the store behind an `Arc<dyn SettingsStore>` so the listener can read
//! the configured port at start time while the service owns writes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::ButtonBoxError;
use crate::types::{EspDevice, Settings};

#[cfg(test)]
mod tests;

/// Settings document file name inside the storage directory
const SETTINGS_FILE: &str = "settings.json";

/// Device list file name inside the storage directory
const DEVICES_FILE: &str = "devices.json";

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem fault while reading or writing a document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document exists but does not parse, or a value failed to serialize
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for ButtonBoxError {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        Self::Storage {
            message,
            source: Some(Box::new(e)),
        }
    }
}

/// Abstract storage interface for the settings record and device list
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the settings record
    ///
    /// A store with no saved record returns `Settings::default()`.
    ///
    /// # Errors
    ///
    /// Returns error if the record exists but cannot be read or parsed
    async fn load(&self) -> Result<Settings, StoreError>;

    /// Save the settings record
    ///
    /// # Errors
    ///
    /// Returns error if storage fails
    async fn save(&self, settings: &Settings) -> Result<(), StoreError>;

    /// Load the known-device list
    ///
    /// A store with no saved list returns an empty vector.
    ///
    /// # Errors
    ///
    /// Returns error if the list exists but cannot be read or parsed
    async fn load_devices(&self) -> Result<Vec<EspDevice>, StoreError>;

    /// Save the known-device list
    ///
    /// # Errors
    ///
    /// Returns error if storage fails
    async fn save_devices(&self, devices: &[EspDevice]) -> Result<(), StoreError>;
}

/// File-backed store keeping both documents in one directory
pub struct JsonSettingsStore {
    settings_path: PathBuf,
    devices_path: PathBuf,
}

impl JsonSettingsStore {
    /// Create a store rooted at `dir`
    ///
    /// The directory is created if it does not exist. Documents are only
    /// read on demand, so a fresh directory is valid.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        Ok(Self {
            settings_path: dir.join(SETTINGS_FILE),
            devices_path: dir.join(DEVICES_FILE),
        })
    }

    async fn read_document<T>(path: &Path) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        if !tokio::fs::try_exists(path).await? {
            return Ok(T::default());
        }

        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Ok(T::default());
        }

        let value = tokio::task::spawn_blocking(move || serde_json::from_slice(&bytes))
            .await
            .map_err(|e| StoreError::Serialization(format!("Deserialization task failed: {e}")))?
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(value)
    }

    async fn write_document<T>(path: &Path, value: T) -> Result<(), StoreError>
    where
        T: Serialize + Send + 'static,
    {
        let bytes = tokio::task::spawn_blocking(move || serde_json::to_vec_pretty(&value))
            .await
            .map_err(|e| StoreError::Serialization(format!("Serialization task failed: {e}")))?
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load(&self) -> Result<Settings, StoreError> {
        Self::read_document(&self.settings_path).await
    }

    async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        Self::write_document(&self.settings_path, settings.clone()).await
    }

    async fn load_devices(&self) -> Result<Vec<EspDevice>, StoreError> {
        Self::read_document(&self.devices_path).await
    }

    async fn save_devices(&self, devices: &[EspDevice]) -> Result<(), StoreError> {
        Self::write_document(&self.devices_path, devices.to_vec()).await
    }
}

/// In-memory store (non-persistent)
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
    devices: RwLock<Vec<EspDevice>>,
}

impl MemorySettingsStore {
    /// Create a new in-memory store with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with `settings`
    #[must_use]
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            devices: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Settings, StoreError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        *self.settings.write().await = settings.clone();
        Ok(())
    }

    async fn load_devices(&self) -> Result<Vec<EspDevice>, StoreError> {
        Ok(self.devices.read().await.clone())
    }

    async fn save_devices(&self, devices: &[EspDevice]) -> Result<(), StoreError> {
        *self.devices.write().await = devices.to_vec();
        Ok(())
    }
}
