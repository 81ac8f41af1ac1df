//! Device registry reconciling wire events into a known-device table
//!
//! The table is keyed by wire device id. Reconciliation is deliberately
//! conservative: unknown senders are registered from any event, but a known
//! device only gets its `last_seen_ms` and battery refreshed by a press
//! (senders throttle keep-alives, so non-press traffic carries no new
//! state), and an event older than the stored `last_seen_ms` never
//! overwrites anything. Every table mutation publishes a snapshot on a
//! watch channel and persists the whole list through the store hook.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::settings::{SettingsStore, StoreError};
use crate::types::{EspDevice, EspMessage};


/// Result of feeding one event through [`DeviceRegistry::reconcile`]
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Whether the event introduced a previously unknown device
    pub created: bool,
    /// The device record after reconciliation
    pub device: EspDevice,
}

/// Known-device table with change notifications
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, EspDevice>>,
    tx: watch::Sender<Vec<EspDevice>>,
    rx: watch::Receiver<Vec<EspDevice>>,
    store: Option<Arc<dyn SettingsStore>>,
}

impl DeviceRegistry {
    /// Create an empty registry with no persistence hook
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(Vec::new());
        Self {
            devices: RwLock::new(HashMap::new()),
            tx,
            rx,
            store: None,
        }
    }

    /// Create an empty registry persisting every mutation through `store`
    #[must_use]
    pub fn with_store(store: Arc<dyn SettingsStore>) -> Self {
        let mut registry = Self::new();
        registry.store = Some(store);
        registry
    }

    /// Load previously persisted devices into the table
    ///
    /// Returns the number of devices restored. A registry without a store
    /// hook restores nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the persisted list cannot be read
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let loaded = store.load_devices().await?;
        let count = loaded.len();

        let mut devices = self.devices.write().await;
        for device in loaded {
            devices.insert(device.id.clone(), device);
        }
        let snapshot = Self::snapshot_of(&devices);
        drop(devices);

        let _ = self.tx.send(snapshot);
        Ok(count)
    }

    /// Feed one decoded event through the registry
    pub async fn reconcile(&self, message: &EspMessage) -> ReconcileOutcome {
        let mut devices = self.devices.write().await;

        let Some(existing) = devices.get_mut(&message.device_id) else {
            let device = EspDevice::from_event(message);
            devices.insert(device.id.clone(), device.clone());
            info!(device_id = %device.id, "registered new device");

            let snapshot = Self::snapshot_of(&devices);
            drop(devices);
            self.publish_and_persist(snapshot).await;

            return ReconcileOutcome {
                created: true,
                device,
            };
        };

        if !message.button_pressed {
            return ReconcileOutcome {
                created: false,
                device: existing.clone(),
            };
        }

        if message.timestamp_ms < existing.last_seen_ms {
            debug!(
                device_id = %message.device_id,
                "ignoring stale event ({} < {})",
                message.timestamp_ms,
                existing.last_seen_ms
            );
            return ReconcileOutcome {
                created: false,
                device: existing.clone(),
            };
        }

        existing.last_seen_ms = message.timestamp_ms;
        if let Some(battery) = message.battery {
            existing.battery = Some(battery);
        }
        let device = existing.clone();

        let snapshot = Self::snapshot_of(&devices);
        drop(devices);
        self.publish_and_persist(snapshot).await;

        ReconcileOutcome {
            created: false,
            device,
        }
    }

    /// Rename a device
    ///
    /// Returns `false` when the device does not exist or the name is empty.
    pub async fn rename(&self, device_id: &str, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.is_empty() {
            return false;
        }

        let mut devices = self.devices.write().await;
        let Some(device) = devices.get_mut(device_id) else {
            return false;
        };
        device.name = name;

        let snapshot = Self::snapshot_of(&devices);
        drop(devices);
        self.publish_and_persist(snapshot).await;
        true
    }

    /// Remove a device from the table
    ///
    /// Returns `false` when the device does not exist. Cascades (clearing
    /// clip assignments, stopping audio) are the caller's responsibility.
    pub async fn remove(&self, device_id: &str) -> bool {
        let mut devices = self.devices.write().await;
        if devices.remove(device_id).is_none() {
            return false;
        }

        let snapshot = Self::snapshot_of(&devices);
        drop(devices);
        self.publish_and_persist(snapshot).await;
        true
    }

    /// Look up one device by id
    pub async fn get(&self, device_id: &str) -> Option<EspDevice> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// All known devices, ordered by id
    pub async fn all(&self) -> Vec<EspDevice> {
        Self::snapshot_of(&*self.devices.read().await)
    }

    /// Number of known devices
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether the table is empty
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Subscribe to device list snapshots
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<EspDevice>> {
        self.rx.clone()
    }

    // Stable id order so observers and the persisted document are
    // deterministic.
    fn snapshot_of(devices: &HashMap<String, EspDevice>) -> Vec<EspDevice> {
        let mut snapshot: Vec<EspDevice> = devices.values().cloned().collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
    }

    async fn publish_and_persist(&self, snapshot: Vec<EspDevice>) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_devices(&snapshot).await {
                warn!("failed to persist device list: {e}");
            }
        }
        let _ = self.tx.send(snapshot);
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
