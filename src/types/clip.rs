use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A manifest entry for an imported audio clip
///
/// The set of `(clip → device)` edges is a partial injective mapping: a
/// device maps to at most one clip and a clip maps to at most one device.
/// [`crate::library::ClipLibrary::assign`] enforces this on every edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    /// Creation-time monotonic token, unique for the life of the manifest
    pub id: String,

    /// User-visible title
    pub title: String,

    /// Location of the managed bytes on disk
    pub path: PathBuf,

    /// Device this clip is assigned to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Whether the clip should play as an indefinite loop
    #[serde(default)]
    pub loop_mode: bool,
}

impl AudioClip {
    /// Generate a fresh clip id
    ///
    /// Ids are `"<epoch_millis>-<seq>"`; the process-wide sequence breaks
    /// ties between imports landing in the same millisecond.
    #[must_use]
    pub fn next_id() -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", super::epoch_millis(), seq)
    }
}
