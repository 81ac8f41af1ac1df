//! Scripted playback engine
//!
//! Channels never make sound and never complete on their own; tests fire
//! completions explicitly and inject failures through the handles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::playback::{
    AudioBuffer, CompletionCallback, EngineChannel, EngineError, PlaybackEngine,
};

#[derive(Default)]
struct ChannelState {
    playing: AtomicBool,
    looping: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_stop: AtomicBool,
    completion: Mutex<Option<CompletionCallback>>,
}

/// Handle to observe and script one channel created by [`MockEngine`]
#[derive(Clone)]
pub struct MockChannelHandle {
    state: Arc<ChannelState>,
}

impl MockChannelHandle {
    /// Whether the channel believes it is audible
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    /// Whether the channel was created in loop mode
    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.state.looping.load(Ordering::SeqCst)
    }

    /// Number of times `start` was called
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    /// Number of times `stop` was called
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    /// Make the next `stop` call fail
    pub fn fail_stop(&self) {
        self.state.fail_stop.store(true, Ordering::SeqCst);
    }

    /// Fire the channel's completion callback, as natural end-of-buffer
    /// would
    pub fn fire_completion(&self) {
        self.state.playing.store(false, Ordering::SeqCst);
        let callback = self
            .state
            .completion
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(callback) = callback {
            callback();
        }
    }
}

struct MockChannel {
    state: Arc<ChannelState>,
}

#[async_trait]
impl EngineChannel for MockChannel {
    async fn start(&mut self, _offset: Duration) -> Result<(), EngineError> {
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        self.state.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_stop.load(Ordering::SeqCst) {
            return Err(EngineError::Channel("injected stop failure".to_string()));
        }
        self.state.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    fn on_completion(&mut self, callback: CompletionCallback) {
        if let Ok(mut slot) = self.state.completion.lock() {
            *slot = Some(callback);
        }
    }
}

/// Playback engine that decodes nothing and plays nothing
pub struct MockEngine {
    decodes: AtomicUsize,
    decode_delay: Mutex<Duration>,
    fail_decode: AtomicBool,
    channels: Mutex<Vec<MockChannelHandle>>,
}

impl MockEngine {
    /// Create a new mock engine
    #[must_use]
    pub fn new() -> Self {
        Self {
            decodes: AtomicUsize::new(0),
            decode_delay: Mutex::new(Duration::ZERO),
            fail_decode: AtomicBool::new(false),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Number of decode calls so far
    #[must_use]
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    /// Make every decode call sleep for `delay` before returning
    pub fn set_decode_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.decode_delay.lock() {
            *slot = delay;
        }
    }

    /// Make decode calls fail
    pub fn fail_decode(&self, fail: bool) {
        self.fail_decode.store(fail, Ordering::SeqCst);
    }

    /// Handles to every channel created so far, in creation order
    #[must_use]
    pub fn channels(&self) -> Vec<MockChannelHandle> {
        self.channels.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Handle to the most recently created channel
    #[must_use]
    pub fn last_channel(&self) -> Option<MockChannelHandle> {
        self.channels
            .lock()
            .ok()
            .and_then(|c| c.last().cloned())
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackEngine for MockEngine {
    async fn decode(&self, _bytes: Bytes) -> Result<AudioBuffer, EngineError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);

        let delay = self.decode_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_decode.load(Ordering::SeqCst) {
            return Err(EngineError::Decode("injected decode failure".to_string()));
        }

        Ok(AudioBuffer {
            sample_rate: 44_100,
            channels: 1,
            samples: Bytes::from_static(&[0, 0, 0, 0]),
        })
    }

    async fn create_channel(
        &self,
        _buffer: AudioBuffer,
        looping: bool,
    ) -> Result<Box<dyn EngineChannel>, EngineError> {
        let state = Arc::new(ChannelState::default());
        state.looping.store(looping, Ordering::SeqCst);

        if let Ok(mut channels) = self.channels.lock() {
            channels.push(MockChannelHandle {
                state: Arc::clone(&state),
            });
        }

        Ok(Box::new(MockChannel { state }))
    }
}
