use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the UDP listener's timing and recovery behavior
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// How long a bind-failure message stays visible before auto-clearing
    /// (default: 5 seconds)
    pub error_ttl: Duration,

    /// Sliding window over which post-bind socket errors are counted
    /// (default: 30 seconds)
    pub error_window: Duration,

    /// Number of socket errors inside the window that trips an automatic
    /// stop-and-restart (default: 8)
    pub error_threshold: usize,

    /// Delay before the automatic restart after the error window trips
    /// (default: 3 seconds)
    pub restart_delay: Duration,

    /// Receive buffer size for a single datagram (default: 2048)
    pub recv_buffer_size: usize,

    /// Capacity of the event fan-out channel (default: 100)
    pub bus_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            error_ttl: Duration::from_secs(5),
            error_window: Duration::from_secs(30),
            error_threshold: 8,
            restart_delay: Duration::from_secs(3),
            recv_buffer_size: 2048,
            bus_capacity: 100,
        }
    }
}

impl ListenerConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> ListenerConfigBuilder {
        ListenerConfigBuilder::default()
    }
}

/// Builder for [`ListenerConfig`]
#[derive(Debug, Clone, Default)]
pub struct ListenerConfigBuilder {
    config: ListenerConfig,
}

impl ListenerConfigBuilder {
    /// Set how long bind-failure messages stay visible
    #[must_use]
    pub fn error_ttl(mut self, ttl: Duration) -> Self {
        self.config.error_ttl = ttl;
        self
    }

    /// Set the socket error counting window
    #[must_use]
    pub fn error_window(mut self, window: Duration) -> Self {
        self.config.error_window = window;
        self
    }

    /// Set the error count that trips an automatic restart
    #[must_use]
    pub fn error_threshold(mut self, threshold: usize) -> Self {
        self.config.error_threshold = threshold;
        self
    }

    /// Set the delay before an automatic restart
    #[must_use]
    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.config.restart_delay = delay;
        self
    }

    /// Set the datagram receive buffer size
    #[must_use]
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.config.recv_buffer_size = size;
        self
    }

    /// Set the fan-out channel capacity
    #[must_use]
    pub fn bus_capacity(mut self, capacity: usize) -> Self {
        self.config.bus_capacity = capacity;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ListenerConfig {
        self.config
    }
}

/// Persisted settings record consumed by the engine
///
/// Field names follow the on-disk JSON written by the companion app, so an
/// existing settings file round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// UDP port the listener binds (default: 4210)
    pub udp_port: u16,

    /// Start the listener as part of service construction
    pub auto_start_listener: bool,

    /// Output volume ceiling, 0.0 to 1.0
    pub max_volume: f32,

    /// UI dark mode flag (persisted here, consumed by the embedder)
    pub dark_mode: bool,

    /// Preferred Bluetooth speaker name, if one was ever chosen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bluetooth_device_name: Option<String>,

    /// Most recently connected speakers, newest first, at most five
    pub last_connected_devices: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            udp_port: 4210,
            auto_start_listener: false,
            max_volume: 1.0,
            dark_mode: false,
            bluetooth_device_name: None,
            last_connected_devices: Vec::new(),
        }
    }
}

impl Settings {
    /// Maximum number of remembered speakers
    pub const MAX_REMEMBERED_DEVICES: usize = 5;

    /// Record a speaker as most recently connected, deduplicating and
    /// truncating to [`Self::MAX_REMEMBERED_DEVICES`]
    pub fn remember_device(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.last_connected_devices.retain(|n| *n != name);
        self.last_connected_devices.insert(0, name);
        self.last_connected_devices
            .truncate(Self::MAX_REMEMBERED_DEVICES);
    }
}
