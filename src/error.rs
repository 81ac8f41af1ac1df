use std::io;
use thiserror::Error;

/// Errors that can occur during `ButtonBox` operations
#[derive(Debug, Error)]
pub enum ButtonBoxError {
    // ===== Listener Errors =====
    /// Failed to bind the UDP listener socket
    #[error("failed to bind UDP port {port}: {source}")]
    Bind {
        /// The port that could not be bound
        port: u16,
        /// The underlying socket error
        #[source]
        source: io::Error,
    },

    /// Socket I/O error after a successful bind
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    // ===== Playback Errors =====
    /// Audio payload could not be decoded
    #[error("failed to decode clip {clip_id}: {message}")]
    Decode {
        /// The clip whose bytes failed to decode
        clip_id: String,
        /// Description of the failure
        message: String,
    },

    /// Playback engine fault outside of decoding
    #[error("playback engine error: {message}")]
    Engine {
        /// Description of the failure
        message: String,
    },

    // ===== Lookup Errors =====
    /// Referenced clip does not exist in the library
    #[error("clip not found: {clip_id}")]
    ClipNotFound {
        /// The ID of the missing clip
        clip_id: String,
    },

    /// Referenced device does not exist in the registry
    #[error("device not found: {device_id}")]
    DeviceNotFound {
        /// The ID of the missing device
        device_id: String,
    },

    // ===== Storage Errors =====
    /// Manifest or settings persistence failed
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ===== State Errors =====
    /// Operation not valid in current state
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the state is invalid
        message: String,
        /// The current state
        current_state: String,
    },
}

impl ButtonBoxError {
    /// Check if this error is recoverable by retrying
    ///
    /// Bind and socket faults are transient: the listener stays restartable
    /// and the error-rate window schedules its own retry.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Socket(_))
    }

    /// Shorthand for a [`ButtonBoxError::Storage`] wrapping an I/O fault
    pub(crate) fn storage(message: impl Into<String>, source: io::Error) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for `ButtonBox` operations
pub type Result<T> = std::result::Result<T, ButtonBoxError>;
