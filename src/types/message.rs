/// A parsed button-device event, the unit of work on the fan-out bus
///
/// Ephemeral: one datagram becomes at most one of these, and nothing
/// persists it.
#[derive(Debug, Clone, PartialEq)]
pub struct EspMessage {
    /// Opaque wire-supplied device identifier
    pub device_id: String,

    /// Whether the button is pressed in this event
    pub button_pressed: bool,

    /// Event timestamp, epoch milliseconds
    ///
    /// Wire-supplied for the structured format when present, otherwise the
    /// receipt time.
    pub timestamp_ms: u64,

    /// Battery fraction as reported, passed through without range checks
    pub battery: Option<f32>,
}
