//! Playback: engine boundary, channel allocation, and the reference engine
//!
//! The allocator ([`PlaybackManager`]) owns which sound is playing where;
//! the engine traits own how sound is made. The `decoders` feature ships
//! `HeadlessEngine`, a symphonia-backed engine that decodes for real and
//! emulates output timing.

mod engine;
mod manager;

#[cfg(feature = "decoders")]
mod decoder;
#[cfg(feature = "decoders")]
mod headless;


pub use engine::{AudioBuffer, CompletionCallback, EngineChannel, EngineError, PlaybackEngine};
pub use manager::{ChannelKey, PlaybackManager, TriggerOutcome};

#[cfg(feature = "decoders")]
pub use headless::HeadlessEngine;
