//! Service wiring and lifecycle
//!
//! [`ButtonBox`] owns every component plus the bridge task that turns
//! bus messages into registry updates and playback triggers. Components
//! are injected through the builder, so tests can swap the engine or the
//! settings store without touching the wiring.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::error::Result;
use crate::library::ClipLibrary;
use crate::listener::{ListenerStatus, UdpListener};
use crate::playback::{PlaybackEngine, PlaybackManager, TriggerOutcome};
use crate::registry::DeviceRegistry;
use crate::settings::{JsonSettingsStore, SettingsStore};
use crate::types::{AudioClip, EspDevice, EspMessage, ListenerConfig, Settings};

#[cfg(feature = "decoders")]
use crate::playback::HeadlessEngine;

/// Button box service: UDP ingestion, device registry, clip library, and
/// playback
///
/// # Example
///
/// ```rust,no_run
/// use buttonbox::ButtonBox;
///
/// # async fn example() -> Result<(), buttonbox::ButtonBoxError> {
/// let service = ButtonBox::builder("/var/lib/buttonbox").build().await?;
///
/// let port = service.start_listener().await?;
/// println!("listening on {port}");
///
/// service.teardown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ButtonBox {
    /// Settings store
    settings: Arc<dyn SettingsStore>,
    /// Clip library
    library: Arc<ClipLibrary>,
    /// Device registry
    registry: Arc<DeviceRegistry>,
    /// Message bus
    bus: Arc<EventBus>,
    /// UDP listener
    listener: Arc<UdpListener>,
    /// Playback manager
    playback: Arc<PlaybackManager>,
    /// Bridge task turning messages into triggers
    bridge: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl ButtonBox {
    /// Start building a service rooted at `data_dir`
    #[must_use]
    pub fn builder(data_dir: impl Into<PathBuf>) -> ButtonBoxBuilder {
        ButtonBoxBuilder {
            data_dir: data_dir.into(),
            engine: None,
            store: None,
            config: ListenerConfig::default(),
        }
    }

    // === Listener ===

    /// Start the UDP listener on the configured port
    ///
    /// # Errors
    ///
    /// Returns error if the settings cannot be read or the port cannot be
    /// bound.
    pub async fn start_listener(&self) -> Result<u16> {
        self.listener.start().await
    }

    /// Stop the UDP listener, releasing its port
    pub async fn stop_listener(&self) {
        self.listener.stop().await;
    }

    /// Current listener status
    #[must_use]
    pub fn listener_status(&self) -> ListenerStatus {
        self.listener.status()
    }

    /// Subscribe to listener status changes
    #[must_use]
    pub fn subscribe_listener(&self) -> watch::Receiver<ListenerStatus> {
        self.listener.subscribe()
    }

    /// Persist a new UDP port and rebind the listener
    ///
    /// No-op when the port is unchanged. The old port is released before
    /// the new one is bound, so the two are never bound at once.
    ///
    /// # Errors
    ///
    /// Returns error if the setting cannot be persisted or the new port
    /// cannot be bound.
    pub async fn update_port(&self, new_port: u16) -> Result<()> {
        let mut settings = self.settings.load().await?;
        if settings.udp_port == new_port {
            debug!(port = new_port, "port unchanged");
            return Ok(());
        }
        settings.udp_port = new_port;
        self.settings.save(&settings).await?;

        self.listener.stop().await;
        self.listener.start().await?;
        info!(port = new_port, "listener rebound");
        Ok(())
    }

    // === Devices ===

    /// Devices currently known to the registry
    pub async fn devices(&self) -> Vec<EspDevice> {
        self.registry.all().await
    }

    /// Rename a device
    ///
    /// Returns `false` when the device is unknown or the name is empty.
    pub async fn rename_device(&self, device_id: &str, name: impl Into<String>) -> bool {
        self.registry.rename(device_id, name).await
    }

    /// Remove a device, clearing its clip assignment and stopping its
    /// audio
    ///
    /// Returns `false` when the device is unknown.
    ///
    /// # Errors
    ///
    /// Returns error if the cleared assignment cannot be persisted.
    pub async fn remove_device(&self, device_id: &str) -> Result<bool> {
        if !self.registry.remove(device_id).await {
            return Ok(false);
        }
        self.library.unassign_device(device_id).await?;
        self.playback.stop_device_audio(device_id).await;
        info!(device_id, "device removed");
        Ok(true)
    }

    /// Subscribe to device list snapshots
    #[must_use]
    pub fn subscribe_devices(&self) -> watch::Receiver<Vec<EspDevice>> {
        self.registry.subscribe()
    }

    // === Clips ===

    /// Import an audio clip into the library
    ///
    /// # Errors
    ///
    /// Returns error if the bytes or the manifest cannot be written.
    pub async fn import_clip(
        &self,
        title: impl Into<String>,
        bytes: &[u8],
        ext: &str,
    ) -> Result<AudioClip> {
        Ok(self.library.import(title, bytes, ext).await?)
    }

    /// Delete a clip, stopping any channels playing it first
    ///
    /// Returns `false` when no clip has that id.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest cannot be rewritten.
    pub async fn delete_clip(&self, clip_id: &str) -> Result<bool> {
        let stopped = self.playback.stop_clip_audio(clip_id).await;
        if stopped > 0 {
            debug!(clip_id, stopped, "stopped channels before delete");
        }
        self.playback.drop_buffer(clip_id).await;
        Ok(self.library.delete(clip_id).await?)
    }

    /// Assign a clip to a device, replacing that device's previous clip
    ///
    /// Returns `false` when the clip does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the assignment cannot be persisted.
    pub async fn assign_clip(&self, clip_id: &str, device_id: &str) -> Result<bool> {
        Ok(self.library.assign(clip_id, device_id).await?)
    }

    // === Components ===

    /// The clip library
    #[must_use]
    pub fn library(&self) -> &ClipLibrary {
        &self.library
    }

    /// The device registry
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The playback manager
    #[must_use]
    pub fn playback(&self) -> &PlaybackManager {
        &self.playback
    }

    /// Subscribe to parsed button messages
    #[must_use]
    pub fn subscribe_messages(&self) -> broadcast::Receiver<EspMessage> {
        self.bus.subscribe()
    }

    // === Lifecycle ===

    /// Stop the listener, the bridge, and every playback channel
    ///
    /// Safe to call more than once.
    pub async fn teardown(&self) {
        self.listener.stop().await;
        if let Some(bridge) = self.bridge.lock().await.take() {
            bridge.abort();
            let _ = bridge.await;
        }
        self.playback.stop_all().await;
        info!("service torn down");
    }

    async fn bridge_loop(
        mut rx: broadcast::Receiver<EspMessage>,
        registry: Arc<DeviceRegistry>,
        playback: Arc<PlaybackManager>,
    ) {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    registry.reconcile(&message).await;
                    if !message.button_pressed {
                        continue;
                    }
                    match playback.trigger_for_device(&message.device_id).await {
                        Ok(TriggerOutcome::Started { clip_id }) => {
                            debug!(device_id = %message.device_id, %clip_id, "press started clip");
                        }
                        Ok(TriggerOutcome::NoMapping) => {}
                        Err(e) => {
                            warn!(device_id = %message.device_id, "trigger failed: {e}");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("bridge lagged behind, {missed} messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Builder for [`ButtonBox`]
pub struct ButtonBoxBuilder {
    data_dir: PathBuf,
    engine: Option<Arc<dyn PlaybackEngine>>,
    store: Option<Arc<dyn SettingsStore>>,
    config: ListenerConfig,
}

impl ButtonBoxBuilder {
    /// Override the playback engine
    ///
    /// Defaults to the decoder-backed headless engine when the `decoders`
    /// feature is enabled.
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn PlaybackEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Override the settings store
    ///
    /// Defaults to a [`JsonSettingsStore`] rooted at the data directory.
    #[must_use]
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the listener configuration
    #[must_use]
    pub fn listener_config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    /// Wire the service together
    ///
    /// Loads persisted settings and devices (falling back to defaults when
    /// a document is unreadable), opens the clip library, spawns the
    /// message bridge, resumes persisted loops, and starts the listener
    /// when `auto_start_listener` is set.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory or manifest cannot be opened,
    /// or no playback engine is available.
    pub async fn build(self) -> Result<ButtonBox> {
        let store: Arc<dyn SettingsStore> = match self.store {
            Some(store) => store,
            None => Arc::new(JsonSettingsStore::new(&self.data_dir).await?),
        };
        let engine = match self.engine {
            Some(engine) => engine,
            None => Self::default_engine()?,
        };

        let settings = match store.load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("failed to load settings, using defaults: {e}");
                Settings::default()
            }
        };

        let library = Arc::new(ClipLibrary::open(&self.data_dir).await?);
        let registry = Arc::new(DeviceRegistry::with_store(Arc::clone(&store)));
        match registry.restore().await {
            Ok(count) if count > 0 => info!("restored {count} known devices"),
            Ok(_) => {}
            Err(e) => warn!("failed to restore device list: {e}"),
        }

        let bus = Arc::new(EventBus::with_capacity(self.config.bus_capacity));
        let listener = Arc::new(UdpListener::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            self.config,
        ));
        let playback = Arc::new(PlaybackManager::new(engine, Arc::clone(&library)));

        let bridge = tokio::spawn(ButtonBox::bridge_loop(
            bus.subscribe(),
            Arc::clone(&registry),
            Arc::clone(&playback),
        ));

        let service = ButtonBox {
            settings: store,
            library,
            registry,
            bus,
            listener,
            playback,
            bridge: Arc::new(Mutex::new(Some(bridge))),
        };

        let resumed = service.playback.resume_loops().await;
        if resumed > 0 {
            info!("resumed {resumed} persisted loops");
        }

        if settings.auto_start_listener {
            if let Err(e) = service.listener.start().await {
                warn!("automatic listener start failed: {e}");
            }
        }

        Ok(service)
    }

    #[cfg(feature = "decoders")]
    fn default_engine() -> Result<Arc<dyn PlaybackEngine>> {
        Ok(Arc::new(HeadlessEngine::new()))
    }

    #[cfg(not(feature = "decoders"))]
    fn default_engine() -> Result<Arc<dyn PlaybackEngine>> {
        Err(crate::error::ButtonBoxError::Engine {
            message: "no playback engine configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio::net::UdpSocket;

    use super::*;
    use crate::listener::ListenerState;
    use crate::settings::MemorySettingsStore;
    use crate::testing::MockEngine;

    const WAV_BYTES: &[u8] = &[0x52, 0x49, 0x46, 0x46, 0x00, 0x00, 0x00, 0x00];

    async fn service_with(dir: &TempDir, settings: Settings) -> (ButtonBox, Arc<MockEngine>) {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemorySettingsStore::with_settings(settings));
        let service = ButtonBox::builder(dir.path())
            .engine(engine.clone())
            .settings_store(store)
            .build()
            .await
            .unwrap();
        (service, engine)
    }

    #[tokio::test]
    async fn test_build_starts_cold() {
        let dir = TempDir::new().unwrap();
        let (service, _engine) = service_with(&dir, Settings::default()).await;

        assert_eq!(service.listener_status().state, ListenerState::Idle);
        assert!(service.devices().await.is_empty());
        assert!(service.library().all().await.is_empty());

        service.teardown().await;
    }

    #[tokio::test]
    async fn test_auto_start_listener() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            udp_port: 0,
            auto_start_listener: true,
            ..Settings::default()
        };
        let (service, _engine) = service_with(&dir, settings).await;

        let status = service.listener_status();
        assert_eq!(status.state, ListenerState::Bound);
        assert!(status.port.is_some());

        service.teardown().await;
    }

    #[tokio::test]
    async fn test_corrupt_settings_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("settings.json"), b"{{{{")
            .await
            .unwrap();

        let engine = Arc::new(MockEngine::new());
        let service = ButtonBox::builder(dir.path())
            .engine(engine)
            .build()
            .await
            .unwrap();

        assert_eq!(service.listener_status().state, ListenerState::Idle);
        service.teardown().await;
    }

    #[tokio::test]
    async fn test_update_port_is_noop_when_unchanged() {
        let dir = TempDir::new().unwrap();
        let (service, _engine) = service_with(&dir, Settings::default()).await;

        service.update_port(4210).await.unwrap();

        assert_eq!(service.listener_status().state, ListenerState::Idle);
        service.teardown().await;
    }

    #[tokio::test]
    async fn test_update_port_rebinds_listener() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            udp_port: 0,
            ..Settings::default()
        };
        let (service, _engine) = service_with(&dir, settings).await;
        service.start_listener().await.unwrap();

        let probe = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let target = probe.local_addr().unwrap().port();
        drop(probe);

        service.update_port(target).await.unwrap();

        let status = service.listener_status();
        assert_eq!(status.state, ListenerState::Bound);
        assert_eq!(status.port, Some(target));

        service.teardown().await;
    }

    #[tokio::test]
    async fn test_remove_device_cascades() {
        let dir = TempDir::new().unwrap();
        let (service, engine) = service_with(&dir, Settings::default()).await;

        let clip = service.import_clip("Clip", WAV_BYTES, "wav").await.unwrap();
        service.assign_clip(&clip.id, "esp-1").await.unwrap();
        service
            .registry()
            .reconcile(&crate::types::EspMessage {
                device_id: "esp-1".to_string(),
                button_pressed: true,
                timestamp_ms: 1,
                battery: None,
            })
            .await;
        service.playback().trigger_for_device("esp-1").await.unwrap();
        assert!(service.playback().is_device_playing("esp-1").await);

        assert!(service.remove_device("esp-1").await.unwrap());

        assert!(service.devices().await.is_empty());
        assert!(service.library().clip_for_device("esp-1").await.is_none());
        assert!(!service.playback().is_device_playing("esp-1").await);
        assert!(!engine.last_channel().unwrap().is_playing());

        service.teardown().await;
    }

    #[tokio::test]
    async fn test_delete_clip_stops_its_channels() {
        let dir = TempDir::new().unwrap();
        let (service, _engine) = service_with(&dir, Settings::default()).await;

        let clip = service.import_clip("Clip", WAV_BYTES, "wav").await.unwrap();
        service.playback().start_loop(&clip.id).await.unwrap();
        assert!(service.playback().is_file_playing(&clip.id).await);

        assert!(service.delete_clip(&clip.id).await.unwrap());

        assert!(!service.playback().is_file_playing(&clip.id).await);
        assert!(service.library().get(&clip.id).await.is_none());

        service.teardown().await;
    }

    #[tokio::test]
    async fn test_loops_resume_on_next_build() {
        let dir = TempDir::new().unwrap();
        let (service, _engine) = service_with(&dir, Settings::default()).await;
        let clip = service.import_clip("Rain", WAV_BYTES, "wav").await.unwrap();
        service.playback().start_loop(&clip.id).await.unwrap();
        service.teardown().await;

        let (service, _engine) = service_with(&dir, Settings::default()).await;

        assert_eq!(service.playback().looping_files().await, [clip.id]);
        service.teardown().await;
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            udp_port: 0,
            ..Settings::default()
        };
        let (service, _engine) = service_with(&dir, settings).await;
        service.start_listener().await.unwrap();

        service.teardown().await;
        service.teardown().await;

        assert_eq!(service.listener_status().state, ListenerState::Idle);
    }
}
