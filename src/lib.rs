//! # buttonbox
//!
//! Network button boxes that play sounds. A UDP listener ingests events
//! from ESP button devices, a registry reconciles them into a known-device
//! table, and a playback manager drives per-device and looping audio
//! channels from a clip library.
//!
//! ## Features
//!
//! - Two wire formats (compact text and structured JSON) behind one codec
//! - Self-healing UDP listener with error-rate windowing and port rebind
//! - Broadcast fan-out of parsed events to any number of subscribers
//! - Device registry with stale-datagram rejection and persistence
//! - Concurrent playback channels with loops, per-device overrides, and a
//!   decode-once buffer cache
//!
//! ## Example
//!
//! ```rust,no_run
//! use buttonbox::ButtonBox;
//!
//! # async fn example() -> Result<(), buttonbox::ButtonBoxError> {
//! let service = ButtonBox::builder("./data").build().await?;
//!
//! // Import a clip and map it onto a button device.
//! let bytes = std::fs::read("doorbell.wav")?;
//! let clip = service.import_clip("Doorbell", &bytes, "wav").await?;
//! service.assign_clip(&clip.id, "ESP01").await?;
//!
//! // Bind the configured UDP port; presses now play the clip.
//! let port = service.start_listener().await?;
//! println!("listening on {port}");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Data flows one way: datagram → codec → bus → registry and playback.
//! [`ButtonBox`] wires the components together; each is also usable on
//! its own with injected dependencies.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

// Internal modules
pub mod bus;
pub mod library;
pub mod listener;
pub mod playback;
pub mod protocol;
pub mod registry;
mod service;
pub mod settings;

// Re-exports
pub use bus::{EventBus, MessageFilter};
pub use error::ButtonBoxError;
pub use library::ClipLibrary;
pub use listener::{ListenerState, ListenerStatus, UdpListener};
pub use playback::{AudioBuffer, PlaybackEngine, PlaybackManager, TriggerOutcome};
pub use registry::{DeviceRegistry, ReconcileOutcome};
pub use service::{ButtonBox, ButtonBoxBuilder};
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
pub use types::{AudioClip, EspDevice, EspMessage, ListenerConfig, Settings};

#[cfg(feature = "decoders")]
pub use playback::HeadlessEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        AudioClip, ButtonBox, ButtonBoxBuilder, ButtonBoxError, ClipLibrary, EspDevice,
        EspMessage, EventBus, ListenerConfig, ListenerState, ListenerStatus, PlaybackManager,
        Settings, TriggerOutcome, UdpListener,
    };
}
