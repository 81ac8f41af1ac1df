//! Playback channel allocation
//!
//! One channel per key: a device trigger owns `ChannelKey::Device`, a loop
//! flag owns `ChannelKey::Loop`. Insertion is replace-if-present, with the
//! replaced channel stopped before the new one starts. The channel table is
//! locked across the stop/start of a key so two interleaved triggers cannot
//! both bind it. Decoded PCM is cached per clip, so concurrent triggers for
//! the same clip wait on a single decode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ButtonBoxError, Result};
use crate::library::ClipLibrary;

use super::engine::{AudioBuffer, CompletionCallback, EngineChannel, PlaybackEngine};

/// Key of one active channel in the allocator's table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// One-shot channel owned by a device trigger
    Device(String),
    /// Loop channel owned by a clip's loop flag
    Loop(String),
}

/// Result of a device trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A channel was started for the device's assigned clip
    Started {
        /// The clip now playing
        clip_id: String,
    },
    /// The device has no assigned clip; nothing was started
    NoMapping,
}

struct ActiveChannel {
    channel: Box<dyn EngineChannel>,
    clip_id: String,
    generation: u64,
}

/// Channel allocator over a playback engine
pub struct PlaybackManager {
    engine: Arc<dyn PlaybackEngine>,
    library: Arc<ClipLibrary>,
    channels: Arc<RwLock<HashMap<ChannelKey, ActiveChannel>>>,
    buffers: RwLock<HashMap<String, Arc<OnceCell<AudioBuffer>>>>,
    generation: AtomicU64,
}

impl PlaybackManager {
    /// Create an allocator playing clips from `library` through `engine`
    #[must_use]
    pub fn new(engine: Arc<dyn PlaybackEngine>, library: Arc<ClipLibrary>) -> Self {
        Self {
            engine,
            library,
            channels: Arc::new(RwLock::new(HashMap::new())),
            buffers: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Play the clip assigned to `device_id` on the device's channel
    ///
    /// Returns [`TriggerOutcome::NoMapping`] when the device has no
    /// assigned clip. A clip already sounding on this device's channel is
    /// stopped first.
    ///
    /// # Errors
    ///
    /// Returns error if the clip bytes cannot be read or decoded, or the
    /// engine rejects the channel
    pub async fn trigger_for_device(&self, device_id: &str) -> Result<TriggerOutcome> {
        let Some(clip) = self.library.clip_for_device(device_id).await else {
            debug!(device_id, "no clip assigned, ignoring trigger");
            return Ok(TriggerOutcome::NoMapping);
        };

        let buffer = self.decoded(&clip.id).await?;

        // The assignment may have changed while the decode was in flight.
        match self.library.clip_for_device(device_id).await {
            Some(current) if current.id == clip.id => {}
            _ => return Ok(TriggerOutcome::NoMapping),
        }

        let mut channel = self
            .engine
            .create_channel(buffer, false)
            .await
            .map_err(|e| ButtonBoxError::Engine {
                message: e.to_string(),
            })?;

        let key = ChannelKey::Device(device_id.to_string());
        let generation = self.next_generation();
        channel.on_completion(self.removal_callback(key.clone(), generation));

        self.swap_in(
            key,
            ActiveChannel {
                channel,
                clip_id: clip.id.clone(),
                generation,
            },
        )
        .await?;

        debug!(device_id, clip_id = %clip.id, "playback started");
        Ok(TriggerOutcome::Started { clip_id: clip.id })
    }

    /// Start a loop channel for `clip_id`, persisting its loop flag
    ///
    /// An already looping clip is restarted. The flag survives restarts,
    /// [`resume_loops`](Self::resume_loops) picks it up on the next start.
    ///
    /// # Errors
    ///
    /// Returns error if the clip does not exist, its bytes cannot be
    /// decoded, or the flag cannot be persisted
    pub async fn start_loop(&self, clip_id: &str) -> Result<()> {
        if !self.library.set_loop_mode(clip_id, true).await? {
            return Err(ButtonBoxError::ClipNotFound {
                clip_id: clip_id.to_string(),
            });
        }

        let result = self.start_loop_channel(clip_id).await;
        if result.is_err() {
            // The flag must not promise audio that never started.
            if let Err(e) = self.library.set_loop_mode(clip_id, false).await {
                warn!("failed to roll back loop flag for {clip_id}: {e}");
            }
        }
        result
    }

    /// Stop the loop channel for `clip_id` and clear its loop flag
    ///
    /// Returns `false` when no loop channel was active.
    ///
    /// # Errors
    ///
    /// Returns error if the flag cannot be persisted
    pub async fn stop_loop(&self, clip_id: &str) -> Result<bool> {
        self.library.set_loop_mode(clip_id, false).await?;

        let previous = self
            .channels
            .write()
            .await
            .remove(&ChannelKey::Loop(clip_id.to_string()));
        let Some(mut active) = previous else {
            return Ok(false);
        };

        if let Err(e) = active.channel.stop().await {
            warn!("failed to stop loop channel for {clip_id}: {e}");
        }
        info!(clip_id, "loop stopped");
        Ok(true)
    }

    /// Stop whatever is sounding on `device_id`'s channel
    ///
    /// Returns `false` when the device had no channel.
    pub async fn stop_device_audio(&self, device_id: &str) -> bool {
        let previous = self
            .channels
            .write()
            .await
            .remove(&ChannelKey::Device(device_id.to_string()));
        let Some(mut active) = previous else {
            return false;
        };

        if let Err(e) = active.channel.stop().await {
            warn!("failed to stop channel for device {device_id}: {e}");
        }
        true
    }

    /// Stop every channel playing `clip_id`, device-owned or loop-owned
    ///
    /// Returns the number of channels stopped. The clip's loop flag is not
    /// touched.
    pub async fn stop_clip_audio(&self, clip_id: &str) -> usize {
        let drained: Vec<ActiveChannel> = {
            let mut channels = self.channels.write().await;
            let keys: Vec<ChannelKey> = channels
                .iter()
                .filter(|(_, active)| active.clip_id == clip_id)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| channels.remove(&key))
                .collect()
        };

        let count = drained.len();
        for mut active in drained {
            if let Err(e) = active.channel.stop().await {
                warn!("failed to stop channel playing clip {clip_id}: {e}");
            }
        }
        count
    }

    /// Stop every active channel
    ///
    /// The channel table is cleared up front, so observers see an empty
    /// allocator even when an underlying stop call fails.
    pub async fn stop_all(&self) {
        let drained: Vec<(ChannelKey, ActiveChannel)> = {
            let mut channels = self.channels.write().await;
            channels.drain().collect()
        };
        if drained.is_empty() {
            return;
        }
        info!("stopping {} active channels", drained.len());

        let stops = drained.into_iter().map(|(key, mut active)| async move {
            if let Err(e) = active.channel.stop().await {
                warn!("failed to stop channel for {key:?}: {e}");
            }
        });
        join_all(stops).await;
    }

    /// Restart loop channels for every clip whose loop flag is set
    ///
    /// Clips that fail to decode are skipped with a warning. Returns the
    /// number of loops started.
    pub async fn resume_loops(&self) -> usize {
        let flagged = self.library.looping().await;
        let mut resumed = 0;

        for clip in flagged {
            if self.is_file_playing(&clip.id).await {
                continue;
            }
            match self.start_loop_channel(&clip.id).await {
                Ok(()) => resumed += 1,
                Err(e) => warn!(clip_id = %clip.id, "failed to resume loop: {e}"),
            }
        }

        if resumed > 0 {
            info!("resumed {resumed} loop channels");
        }
        resumed
    }

    /// Whether `device_id`'s channel is currently audible
    pub async fn is_device_playing(&self, device_id: &str) -> bool {
        self.channels
            .read()
            .await
            .get(&ChannelKey::Device(device_id.to_string()))
            .is_some_and(|active| active.channel.is_playing())
    }

    /// Whether any channel is currently playing `clip_id`
    pub async fn is_file_playing(&self, clip_id: &str) -> bool {
        self.channels
            .read()
            .await
            .values()
            .any(|active| active.clip_id == clip_id && active.channel.is_playing())
    }

    /// Ids of devices with an audible channel, in id order
    pub async fn playing_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self
            .channels
            .read()
            .await
            .iter()
            .filter_map(|(key, active)| match key {
                ChannelKey::Device(id) if active.channel.is_playing() => Some(id.clone()),
                _ => None,
            })
            .collect();
        devices.sort();
        devices
    }

    /// Ids of clips with an active loop channel, in id order
    pub async fn looping_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .channels
            .read()
            .await
            .keys()
            .filter_map(|key| match key {
                ChannelKey::Loop(id) => Some(id.clone()),
                ChannelKey::Device(_) => None,
            })
            .collect();
        files.sort();
        files
    }

    /// Evict a clip's decoded PCM from the cache
    ///
    /// The next trigger for the clip decodes again. Used when a clip is
    /// deleted or its bytes replaced.
    pub async fn drop_buffer(&self, clip_id: &str) {
        self.buffers.write().await.remove(clip_id);
    }

    async fn start_loop_channel(&self, clip_id: &str) -> Result<()> {
        let buffer = self.decoded(clip_id).await?;

        // The clip may have been deleted while the decode was in flight.
        if self.library.get(clip_id).await.is_none() {
            return Err(ButtonBoxError::ClipNotFound {
                clip_id: clip_id.to_string(),
            });
        }

        let channel = self
            .engine
            .create_channel(buffer, true)
            .await
            .map_err(|e| ButtonBoxError::Engine {
                message: e.to_string(),
            })?;

        let key = ChannelKey::Loop(clip_id.to_string());
        let generation = self.next_generation();
        self.swap_in(
            key,
            ActiveChannel {
                channel,
                clip_id: clip_id.to_string(),
                generation,
            },
        )
        .await?;

        info!(clip_id, "loop started");
        Ok(())
    }

    /// Get the decoded buffer for a clip, decoding at most once
    async fn decoded(&self, clip_id: &str) -> Result<AudioBuffer> {
        let cell = {
            let mut buffers = self.buffers.write().await;
            Arc::clone(
                buffers
                    .entry(clip_id.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let buffer = cell
            .get_or_try_init(|| async {
                let bytes = self.library.read_bytes(clip_id).await?;
                self.engine
                    .decode(bytes)
                    .await
                    .map_err(|e| ButtonBoxError::Decode {
                        clip_id: clip_id.to_string(),
                        message: e.to_string(),
                    })
            })
            .await?;

        Ok(buffer.clone())
    }

    // Replace-if-present insertion. The table lock is held across the
    // stop/start so no other task can race this key, and a completion
    // firing mid-swap blocks until the new channel is in the table, where
    // the generation check rejects it.
    async fn swap_in(&self, key: ChannelKey, mut active: ActiveChannel) -> Result<()> {
        let mut channels = self.channels.write().await;

        if let Some(mut previous) = channels.remove(&key) {
            if let Err(e) = previous.channel.stop().await {
                warn!("failed to stop replaced channel for {key:?}: {e}");
            }
        }

        active
            .channel
            .start(Duration::ZERO)
            .await
            .map_err(|e| ButtonBoxError::Engine {
                message: e.to_string(),
            })?;
        channels.insert(key, active);
        Ok(())
    }

    fn removal_callback(&self, key: ChannelKey, generation: u64) -> CompletionCallback {
        let channels = Arc::clone(&self.channels);
        Box::new(move || {
            tokio::spawn(async move {
                let mut table = channels.write().await;
                let current = table
                    .get(&key)
                    .is_some_and(|active| active.generation == generation);
                if current {
                    table.remove(&key);
                }
            });
        })
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }
}
