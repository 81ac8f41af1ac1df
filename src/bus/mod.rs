//! Fan-out bus for decoded button messages
//!
//! Messages are broadcast in arrival order. Every subscriber gets its own
//! cursor into the stream: a slow, panicked, or dropped subscriber cannot
//! affect delivery to the others, and dropping the receiver is the only
//! unsubscribe there is. Subscribers never see messages emitted before
//! they subscribed.

use tokio::sync::broadcast;

use crate::types::EspMessage;


/// Default number of messages buffered per subscriber before lagging
pub const DEFAULT_BUS_CAPACITY: usize = 100;

/// Broadcast bus distributing decoded messages to all subscribers
pub struct EventBus {
    /// Broadcast sender
    tx: broadcast::Sender<EspMessage>,
}

impl EventBus {
    /// Create a new bus with the default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a new bus buffering up to `capacity` messages per subscriber
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to messages emitted after this call
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EspMessage> {
        self.tx.subscribe()
    }

    /// Emit a message to all current subscribers
    pub fn emit(&self, message: EspMessage) {
        // Ignore error if no receivers
        let _ = self.tx.send(message);
    }

    /// Get subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Filtered view over the bus for selective consumers
pub struct MessageFilter {
    rx: broadcast::Receiver<EspMessage>,
    filter: Box<dyn Fn(&EspMessage) -> bool + Send>,
}

impl MessageFilter {
    /// Create a filtered receiver over `bus`
    pub fn new<F>(bus: &EventBus, filter: F) -> Self
    where
        F: Fn(&EspMessage) -> bool + Send + 'static,
    {
        Self {
            rx: bus.subscribe(),
            filter: Box::new(filter),
        }
    }

    /// Receive the next matching message
    ///
    /// Skips non-matching and lagged messages; returns `None` once the bus
    /// is gone.
    pub async fn recv(&mut self) -> Option<EspMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) if (self.filter)(&message) => return Some(message),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Helper constructors for common filters
impl MessageFilter {
    /// Only press events, skipping releases
    #[must_use]
    pub fn presses(bus: &EventBus) -> Self {
        Self::new(bus, |m| m.button_pressed)
    }

    /// Only messages from one device
    #[must_use]
    pub fn for_device(bus: &EventBus, device_id: impl Into<String>) -> Self {
        let device_id = device_id.into();
        Self::new(bus, move |m| m.device_id == device_id)
    }
}
