//! Playback engine abstraction
//!
//! Trait seam between the channel allocator and whatever actually makes
//! sound. The crate ships a decoder-backed `HeadlessEngine` behind the
//! `decoders` feature; tests inject mocks.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Errors from the playback engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Payload is not decodable audio
    #[error("decode error: {0}")]
    Decode(String),

    /// Channel operation failed
    #[error("channel error: {0}")]
    Channel(String),
}

/// Decoded PCM ready for playback
///
/// Samples are interleaved little-endian `f32`, wrapped in [`Bytes`] so a
/// cached buffer clones into each channel without copying.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Interleaved little-endian `f32` samples
    pub samples: Bytes,
}

impl AudioBuffer {
    const BYTES_PER_SAMPLE: usize = 4;

    /// Number of frames (one sample per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / (Self::BYTES_PER_SAMPLE * usize::from(self.channels))
    }

    /// Playback duration at the buffer's sample rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}

/// Callback fired once when a non-looping channel reaches the end of its
/// buffer
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Playback engine
///
/// Implementations decode clip bytes and hand out channels.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Decode raw clip bytes into PCM
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not decodable audio
    async fn decode(&self, bytes: Bytes) -> Result<AudioBuffer, EngineError>;

    /// Create a channel over a decoded buffer
    ///
    /// A looping channel repeats until stopped and never completes
    /// naturally; its completion callback is never invoked.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot allocate a channel
    async fn create_channel(
        &self,
        buffer: AudioBuffer,
        looping: bool,
    ) -> Result<Box<dyn EngineChannel>, EngineError>;
}

/// One playback channel (a single sound currently sounding)
#[async_trait]
pub trait EngineChannel: Send + Sync {
    /// Begin playback `offset` into the buffer
    ///
    /// Starting an already playing channel restarts it.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying output rejects the start
    async fn start(&mut self, offset: Duration) -> Result<(), EngineError>;

    /// Stop playback
    ///
    /// Stopping an already stopped channel is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying output rejects the stop
    async fn stop(&mut self) -> Result<(), EngineError>;

    /// Whether the channel is currently audible
    fn is_playing(&self) -> bool;

    /// Register the completion callback, replacing any previous one
    fn on_completion(&mut self, callback: CompletionCallback);
}
