//! Core types module

mod clip;
mod config;
mod device;
mod message;

#[cfg(test)]
mod tests;

pub use clip::AudioClip;
pub use config::{ListenerConfig, ListenerConfigBuilder, Settings};
pub use device::EspDevice;
pub use message::EspMessage;

/// Milliseconds since the Unix epoch, the timestamp base used on the wire
/// and in the device registry.
#[must_use]
pub fn epoch_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
