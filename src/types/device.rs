use serde::{Deserialize, Serialize};

use super::message::EspMessage;

/// A remote button device known to the registry
///
/// Devices are created the first time a datagram arrives from an unknown id
/// and live until explicitly removed. The id is whatever the device put on
/// the wire; the display name starts as a copy of it and is only ever
/// changed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspDevice {
    /// Opaque wire-supplied identifier
    pub id: String,

    /// Human-readable display name (mutable by the user)
    pub name: String,

    /// Timestamp of the newest accepted event, epoch milliseconds
    pub last_seen_ms: u64,

    /// Last reported battery fraction, if the device ever reported one
    ///
    /// Last-known-value semantics: an event without a battery reading never
    /// clears this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<f32>,
}

impl EspDevice {
    /// Create a device from its first observed event
    #[must_use]
    pub fn from_event(event: &EspMessage) -> Self {
        Self {
            id: event.device_id.clone(),
            name: event.device_id.clone(),
            last_seen_ms: event.timestamp_ms,
            battery: event.battery,
        }
    }
}
