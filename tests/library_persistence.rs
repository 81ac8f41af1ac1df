//! Library persistence round-trips against real files

use std::sync::Once;

use tempfile::TempDir;

use buttonbox::ClipLibrary;

static INIT: Once = Once::new();

/// Initialize test environment
fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info")
            .with_test_writer()
            .try_init();
    });
}

#[tokio::test]
async fn test_import_then_delete_leaves_no_trace() {
    init();
    let dir = TempDir::new().unwrap();
    let library = ClipLibrary::open(dir.path()).await.unwrap();

    let clip = library.import("Chime", b"clip payload", "wav").await.unwrap();
    assert!(tokio::fs::try_exists(&clip.path).await.unwrap());

    assert!(library.delete(&clip.id).await.unwrap());

    assert!(!tokio::fs::try_exists(&clip.path).await.unwrap());
    let manifest = tokio::fs::read_to_string(dir.path().join("manifest.json"))
        .await
        .unwrap();
    assert!(!manifest.contains(&clip.id));

    let mut entries = tokio::fs::read_dir(dir.path().join("clips")).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_manifest_survives_reopen() {
    init();
    let dir = TempDir::new().unwrap();

    let (rain_id, wind_id) = {
        let library = ClipLibrary::open(dir.path()).await.unwrap();
        let rain = library.import("Rain", b"rain bytes", "wav").await.unwrap();
        let wind = library.import("Wind", b"wind bytes", "mp3").await.unwrap();
        library.assign(&rain.id, "esp-porch").await.unwrap();
        library.set_loop_mode(&wind.id, true).await.unwrap();
        (rain.id, wind.id)
    };

    let library = ClipLibrary::open(dir.path()).await.unwrap();

    let clips = library.all().await;
    assert_eq!(clips.len(), 2);

    let rain = library.get(&rain_id).await.unwrap();
    assert_eq!(rain.title, "Rain");
    assert_eq!(rain.device_id.as_deref(), Some("esp-porch"));
    assert!(!rain.loop_mode);

    let wind = library.get(&wind_id).await.unwrap();
    assert!(wind.loop_mode);
    assert_eq!(library.looping().await.len(), 1);

    let bytes = library.read_bytes(&rain_id).await.unwrap();
    assert_eq!(&bytes[..], b"rain bytes");
}

#[tokio::test]
async fn test_assignments_stay_injective_across_reopen() {
    init();
    let dir = TempDir::new().unwrap();

    let (a_id, b_id) = {
        let library = ClipLibrary::open(dir.path()).await.unwrap();
        let a = library.import("A", b"a", "wav").await.unwrap();
        let b = library.import("B", b"b", "wav").await.unwrap();
        library.assign(&a.id, "d1").await.unwrap();
        // B takes over d1; A must end up unassigned.
        library.assign(&b.id, "d1").await.unwrap();
        (a.id, b.id)
    };

    let library = ClipLibrary::open(dir.path()).await.unwrap();

    assert!(library.get(&a_id).await.unwrap().device_id.is_none());
    assert_eq!(library.get(&b_id).await.unwrap().device_id.as_deref(), Some("d1"));
    assert_eq!(library.clip_for_device("d1").await.unwrap().id, b_id);
}
