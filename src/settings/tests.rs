use tempfile::TempDir;

use super::*;

#[tokio::test]
async fn test_memory_store_round_trip() {
    let store = MemorySettingsStore::new();

    let mut settings = store.load().await.unwrap();
    assert_eq!(settings.udp_port, 4210);

    settings.udp_port = 5000;
    settings.dark_mode = true;
    store.save(&settings).await.unwrap();

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded.udp_port, 5000);
    assert!(loaded.dark_mode);
}

#[tokio::test]
async fn test_memory_store_with_settings() {
    let settings = Settings {
        udp_port: 0,
        ..Settings::default()
    };
    let store = MemorySettingsStore::with_settings(settings);

    assert_eq!(store.load().await.unwrap().udp_port, 0);
}

#[tokio::test]
async fn test_json_store_defaults_when_empty() {
    let dir = TempDir::new().unwrap();
    let store = JsonSettingsStore::new(dir.path()).await.unwrap();

    let settings = store.load().await.unwrap();
    assert_eq!(settings.udp_port, 4210);
    assert!(!settings.auto_start_listener);

    let devices = store.load_devices().await.unwrap();
    assert!(devices.is_empty());
}

#[tokio::test]
async fn test_json_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = JsonSettingsStore::new(dir.path()).await.unwrap();

    let settings = Settings {
        udp_port: 9999,
        bluetooth_device_name: Some("JBL Flip".to_string()),
        ..Settings::default()
    };
    store.save(&settings).await.unwrap();

    // A fresh store over the same directory sees the saved document.
    let reopened = JsonSettingsStore::new(dir.path()).await.unwrap();
    let loaded = reopened.load().await.unwrap();
    assert_eq!(loaded.udp_port, 9999);
    assert_eq!(loaded.bluetooth_device_name.as_deref(), Some("JBL Flip"));
}

#[tokio::test]
async fn test_json_store_device_list_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = JsonSettingsStore::new(dir.path()).await.unwrap();

    let devices = vec![
        EspDevice {
            id: "esp-1".to_string(),
            name: "Kitchen".to_string(),
            last_seen_ms: 1_000,
            battery: Some(0.5),
        },
        EspDevice {
            id: "esp-2".to_string(),
            name: "esp-2".to_string(),
            last_seen_ms: 2_000,
            battery: None,
        },
    ];
    store.save_devices(&devices).await.unwrap();

    let loaded = store.load_devices().await.unwrap();
    assert_eq!(loaded, devices);
}

#[tokio::test]
async fn test_json_store_creates_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("deeply").join("nested");

    let store = JsonSettingsStore::new(&nested).await.unwrap();
    store.save(&Settings::default()).await.unwrap();

    assert!(nested.join("settings.json").exists());
}

#[tokio::test]
async fn test_json_store_corrupt_document_is_an_error() {
    let dir = TempDir::new().unwrap();
    tokio::fs::write(dir.path().join("settings.json"), b"{not json")
        .await
        .unwrap();

    let store = JsonSettingsStore::new(dir.path()).await.unwrap();
    let result = store.load().await;

    assert!(matches!(result, Err(StoreError::Serialization(_))));
}

#[tokio::test]
async fn test_store_error_converts_to_storage_variant() {
    let err: ButtonBoxError = StoreError::Serialization("bad document".to_string()).into();

    assert!(matches!(err, ButtonBoxError::Storage { .. }));
    assert!(err.to_string().contains("bad document"));
}
