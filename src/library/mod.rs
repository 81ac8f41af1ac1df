//! Audio clip library
//!
//! Clip bytes live under `<root>/clips/`, metadata in `<root>/manifest.json`
//! (a JSON array rewritten whole on every mutation). The manifest is the
//! source of truth: clip-to-device assignment, loop flags, and titles all
//! live here. Assignment is injective per device, at most one clip can be
//! mapped to a given device at a time.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{ButtonBoxError, Result};
use crate::settings::StoreError;
use crate::types::AudioClip;


/// Manifest file name inside the library root
const MANIFEST_FILE: &str = "manifest.json";

/// Subdirectory holding the managed clip bytes
const CLIPS_DIR: &str = "clips";

/// File-backed clip catalog with managed byte storage
pub struct ClipLibrary {
    clips_dir: PathBuf,
    manifest_path: PathBuf,
    clips: RwLock<Vec<AudioClip>>,
}

impl ClipLibrary {
    /// Open the library rooted at `root`
    ///
    /// Creates the directory layout if missing. An absent manifest means an
    /// empty library.
    ///
    /// # Errors
    ///
    /// Returns error if directories cannot be created or an existing
    /// manifest cannot be read or parsed
    pub async fn open(root: impl AsRef<Path>) -> std::result::Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let clips_dir = root.join(CLIPS_DIR);
        tokio::fs::create_dir_all(&clips_dir).await?;

        let manifest_path = root.join(MANIFEST_FILE);
        let clips = Self::load_manifest(&manifest_path).await?;

        Ok(Self {
            clips_dir,
            manifest_path,
            clips: RwLock::new(clips),
        })
    }

    async fn load_manifest(path: &Path) -> std::result::Result<Vec<AudioClip>, StoreError> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Vec::new());
        }

        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let clips = tokio::task::spawn_blocking(move || serde_json::from_slice(&bytes))
            .await
            .map_err(|e| StoreError::Serialization(format!("Deserialization task failed: {e}")))?
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(clips)
    }

    async fn save_manifest(&self, clips: &[AudioClip]) -> std::result::Result<(), StoreError> {
        let clips = clips.to_vec();
        let bytes = tokio::task::spawn_blocking(move || serde_json::to_vec_pretty(&clips))
            .await
            .map_err(|e| StoreError::Serialization(format!("Serialization task failed: {e}")))?
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        tokio::fs::write(&self.manifest_path, bytes).await?;
        Ok(())
    }

    /// Import a clip into managed storage
    ///
    /// Copies `bytes` to `<root>/clips/<id>.<ext>` and appends a manifest
    /// entry with a fresh id. The new clip starts unassigned and
    /// non-looping.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes or the manifest cannot be written
    pub async fn import(
        &self,
        title: impl Into<String>,
        bytes: &[u8],
        ext: &str,
    ) -> std::result::Result<AudioClip, StoreError> {
        let id = AudioClip::next_id();
        let path = self.clips_dir.join(format!("{id}.{ext}"));
        tokio::fs::write(&path, bytes).await?;

        let clip = AudioClip {
            id,
            title: title.into(),
            path: path.clone(),
            device_id: None,
            loop_mode: false,
        };

        let mut clips = self.clips.write().await;
        clips.push(clip.clone());
        if let Err(e) = self.save_manifest(&clips).await {
            // Roll back so the catalog never references an unsaved entry.
            clips.pop();
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("failed to remove orphaned clip file {path:?}: {remove_err}");
            }
            return Err(e);
        }

        Ok(clip)
    }

    /// Delete a clip, removing both its manifest entry and managed bytes
    ///
    /// Returns `false` when no clip has that id. Callers are expected to
    /// stop any channels playing the clip first.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest cannot be rewritten
    pub async fn delete(&self, clip_id: &str) -> std::result::Result<bool, StoreError> {
        let mut clips = self.clips.write().await;
        let Some(index) = clips.iter().position(|c| c.id == clip_id) else {
            return Ok(false);
        };

        let removed = clips.remove(index);
        self.save_manifest(&clips).await?;
        drop(clips);

        match tokio::fs::remove_file(&removed.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove clip file {:?}: {e}", removed.path),
        }

        Ok(true)
    }

    /// Assign a clip to a device
    ///
    /// At most one clip maps to a device: any clip currently assigned to
    /// `device_id` is unassigned first. Returns `false` when the clip does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest cannot be rewritten
    pub async fn assign(
        &self,
        clip_id: &str,
        device_id: &str,
    ) -> std::result::Result<bool, StoreError> {
        let mut clips = self.clips.write().await;
        if !clips.iter().any(|c| c.id == clip_id) {
            return Ok(false);
        }

        for clip in clips.iter_mut() {
            if clip.device_id.as_deref() == Some(device_id) {
                clip.device_id = None;
            }
        }
        if let Some(clip) = clips.iter_mut().find(|c| c.id == clip_id) {
            clip.device_id = Some(device_id.to_string());
        }

        self.save_manifest(&clips).await?;
        Ok(true)
    }

    /// Clear whatever clip is assigned to `device_id`
    ///
    /// Returns `false` when nothing was assigned.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest cannot be rewritten
    pub async fn unassign_device(&self, device_id: &str) -> std::result::Result<bool, StoreError> {
        let mut clips = self.clips.write().await;
        let mut changed = false;
        for clip in clips.iter_mut() {
            if clip.device_id.as_deref() == Some(device_id) {
                clip.device_id = None;
                changed = true;
            }
        }

        if changed {
            self.save_manifest(&clips).await?;
        }
        Ok(changed)
    }

    /// Set a clip's loop flag, persisting it for the next app start
    ///
    /// Returns `false` when no clip has that id.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest cannot be rewritten
    pub async fn set_loop_mode(
        &self,
        clip_id: &str,
        loop_mode: bool,
    ) -> std::result::Result<bool, StoreError> {
        let mut clips = self.clips.write().await;
        let Some(clip) = clips.iter_mut().find(|c| c.id == clip_id) else {
            return Ok(false);
        };

        clip.loop_mode = loop_mode;
        self.save_manifest(&clips).await?;
        Ok(true)
    }

    /// Rename a clip
    ///
    /// Returns `false` when the clip does not exist or the title is empty.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest cannot be rewritten
    pub async fn rename(
        &self,
        clip_id: &str,
        title: impl Into<String>,
    ) -> std::result::Result<bool, StoreError> {
        let title = title.into();
        if title.is_empty() {
            return Ok(false);
        }

        let mut clips = self.clips.write().await;
        let Some(clip) = clips.iter_mut().find(|c| c.id == clip_id) else {
            return Ok(false);
        };

        clip.title = title;
        self.save_manifest(&clips).await?;
        Ok(true)
    }

    /// Read a clip's managed bytes
    ///
    /// # Errors
    ///
    /// Returns [`ButtonBoxError::ClipNotFound`] for an unknown id, or a
    /// storage error if the bytes cannot be read
    pub async fn read_bytes(&self, clip_id: &str) -> Result<Bytes> {
        let path = {
            let clips = self.clips.read().await;
            clips
                .iter()
                .find(|c| c.id == clip_id)
                .map(|c| c.path.clone())
                .ok_or_else(|| ButtonBoxError::ClipNotFound {
                    clip_id: clip_id.to_string(),
                })?
        };

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ButtonBoxError::storage(format!("failed to read clip {clip_id}"), e))?;

        Ok(Bytes::from(bytes))
    }

    /// Look up one clip by id
    pub async fn get(&self, clip_id: &str) -> Option<AudioClip> {
        self.clips.read().await.iter().find(|c| c.id == clip_id).cloned()
    }

    /// The clip assigned to `device_id`, if any
    pub async fn clip_for_device(&self, device_id: &str) -> Option<AudioClip> {
        self.clips
            .read()
            .await
            .iter()
            .find(|c| c.device_id.as_deref() == Some(device_id))
            .cloned()
    }

    /// All clips in manifest order
    pub async fn all(&self) -> Vec<AudioClip> {
        self.clips.read().await.clone()
    }

    /// All clips whose loop flag is set
    pub async fn looping(&self) -> Vec<AudioClip> {
        self.clips
            .read()
            .await
            .iter()
            .filter(|c| c.loop_mode)
            .cloned()
            .collect()
    }
}
