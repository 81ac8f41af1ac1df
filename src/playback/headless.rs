//! Decoder-backed engine without an audio device
//!
//! Decodes clip bytes for real, then emulates output purely on the tokio
//! clock: a channel stays audible for exactly the buffer duration, and a
//! loop stays audible until stopped. Gives integration setups real decode
//! errors and real timing with no hardware output path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinHandle;

use super::decoder;
use super::engine::{
    AudioBuffer, CompletionCallback, EngineChannel, EngineError, PlaybackEngine,
};

/// Engine that decodes for real and emulates output timing
#[derive(Debug, Default)]
pub struct HeadlessEngine;

impl HeadlessEngine {
    /// Create a new headless engine
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlaybackEngine for HeadlessEngine {
    async fn decode(&self, bytes: Bytes) -> Result<AudioBuffer, EngineError> {
        tokio::task::spawn_blocking(move || decoder::decode_bytes(bytes))
            .await
            .map_err(|e| EngineError::Decode(format!("decode task failed: {e}")))?
    }

    async fn create_channel(
        &self,
        buffer: AudioBuffer,
        looping: bool,
    ) -> Result<Box<dyn EngineChannel>, EngineError> {
        Ok(Box::new(HeadlessChannel::new(buffer.duration(), looping)))
    }
}

/// Channel that is "audible" for the buffer duration on the tokio clock
pub struct HeadlessChannel {
    duration: Duration,
    looping: bool,
    playing: Arc<AtomicBool>,
    completion: Arc<Mutex<Option<CompletionCallback>>>,
    timer: Option<JoinHandle<()>>,
}

impl HeadlessChannel {
    fn new(duration: Duration, looping: bool) -> Self {
        Self {
            duration,
            looping,
            playing: Arc::new(AtomicBool::new(false)),
            completion: Arc::new(Mutex::new(None)),
            timer: None,
        }
    }
}

#[async_trait]
impl EngineChannel for HeadlessChannel {
    async fn start(&mut self, offset: Duration) -> Result<(), EngineError> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.playing.store(true, Ordering::SeqCst);

        // Loops have no end to schedule; they stay audible until stopped.
        if self.looping {
            return Ok(());
        }

        let remaining = self.duration.saturating_sub(offset);
        let playing = Arc::clone(&self.playing);
        let completion = Arc::clone(&self.completion);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            playing.store(false, Ordering::SeqCst);

            let callback = completion.lock().ok().and_then(|mut slot| slot.take());
            if let Some(callback) = callback {
                callback();
            }
        }));

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn on_completion(&mut self, callback: CompletionCallback) {
        if let Ok(mut slot) = self.completion.lock() {
            *slot = Some(callback);
        }
    }
}

impl Drop for HeadlessChannel {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
