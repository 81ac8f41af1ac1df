//! Datagram codec for button-device wire messages
//!
//! Two textual formats are accepted, tried in order:
//!
//! 1. Compact: `BUTTON:<deviceId>:<state>` where `<state>` is `1` for
//!    pressed and anything else for released.
//! 2. Structured: a JSON object carrying at least `deviceId` and
//!    `buttonPressed`.
//!
//! Everything else is rejected. Rejection means "no event": malformed input
//! is logged at debug level and dropped, and never propagates an error past
//! this boundary.

use serde_json::Value;

use crate::types::EspMessage;


/// Battery fraction reported for the compact format, which carries no
/// battery field on the wire.
pub const COMPACT_BATTERY_DEFAULT: f32 = 1.0;

/// A classified wire message, before receipt-time defaults are applied
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Compact `BUTTON:<deviceId>:<state>` form
    Compact {
        /// Wire-supplied device id
        device_id: String,
        /// Whether `<state>` was exactly `1`
        pressed: bool,
    },
    /// Structured JSON object form
    Structured {
        /// Wire-supplied device id
        device_id: String,
        /// The `buttonPressed` field
        pressed: bool,
        /// The `timestamp` field, when present and a whole number
        timestamp_ms: Option<u64>,
        /// The `batteryLevel` field, passed through without range checks
        battery: Option<f32>,
    },
}

impl WireMessage {
    /// Classify a UTF-8 payload into one of the two wire formats
    ///
    /// Returns `None` when the text matches neither format or fails
    /// required-field validation.
    #[must_use]
    pub fn classify(text: &str) -> Option<Self> {
        if let Some(message) = Self::classify_compact(text) {
            return Some(message);
        }
        Self::classify_structured(text)
    }

    fn classify_compact(text: &str) -> Option<Self> {
        let rest = text.strip_prefix("BUTTON:")?;
        let (device_id, state) = rest.split_once(':')?;
        if device_id.is_empty() {
            tracing::debug!("rejecting compact message with empty device id");
            return None;
        }

        Some(Self::Compact {
            device_id: device_id.to_string(),
            // Only the exact string "1" means pressed; any other state
            // value is a release.
            pressed: state == "1",
        })
    }

    fn classify_structured(text: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("rejecting datagram, not valid JSON: {e}");
                return None;
            }
        };

        let Some(object) = value.as_object() else {
            tracing::debug!("rejecting structured message, payload is not an object");
            return None;
        };

        let device_id = match object.get("deviceId").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            Some(_) => {
                tracing::debug!("rejecting structured message with empty deviceId");
                return None;
            }
            None => {
                tracing::debug!("rejecting structured message without string deviceId");
                return None;
            }
        };

        let Some(pressed) = object.get("buttonPressed").and_then(Value::as_bool) else {
            tracing::debug!(
                device_id = %device_id,
                "rejecting structured message without boolean buttonPressed"
            );
            return None;
        };

        #[allow(clippy::cast_possible_truncation)]
        let battery = object
            .get("batteryLevel")
            .and_then(Value::as_f64)
            .map(|level| level as f32);

        Some(Self::Structured {
            device_id,
            pressed,
            timestamp_ms: object.get("timestamp").and_then(Value::as_u64),
            battery,
        })
    }

    /// Resolve this wire message into an event, applying receipt-time
    /// defaults for fields the wire did not supply
    #[must_use]
    pub fn into_message(self, received_at_ms: u64) -> EspMessage {
        match self {
            Self::Compact { device_id, pressed } => EspMessage {
                device_id,
                button_pressed: pressed,
                timestamp_ms: received_at_ms,
                battery: Some(COMPACT_BATTERY_DEFAULT),
            },
            Self::Structured {
                device_id,
                pressed,
                timestamp_ms,
                battery,
            } => EspMessage {
                device_id,
                button_pressed: pressed,
                timestamp_ms: timestamp_ms.unwrap_or(received_at_ms),
                battery,
            },
        }
    }
}

/// Parse one raw datagram into an event
///
/// `received_at_ms` is the receipt timestamp (epoch milliseconds) used when
/// the wire does not supply one. Any input that is not valid UTF-8, matches
/// neither wire format, or fails field validation yields `None`; this
/// function never panics, whatever the bytes.
#[must_use]
pub fn parse_datagram(raw: &[u8], received_at_ms: u64) -> Option<EspMessage> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("rejecting datagram, not valid UTF-8: {e}");
            return None;
        }
    };

    WireMessage::classify(text).map(|wire| wire.into_message(received_at_ms))
}
