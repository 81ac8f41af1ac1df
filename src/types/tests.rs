use super::*;
use crate::types::message::EspMessage;

#[test]
fn test_listener_config_builder() {
    let config = ListenerConfig::builder()
        .error_threshold(3)
        .restart_delay(std::time::Duration::from_millis(100))
        .build();

    assert_eq!(config.error_threshold, 3);
    assert_eq!(config.restart_delay, std::time::Duration::from_millis(100));
    // Untouched knobs keep their defaults
    assert_eq!(config.recv_buffer_size, 2048);
}

#[test]
fn test_settings_defaults() {
    let settings = Settings::default();

    assert_eq!(settings.udp_port, 4210);
    assert!(!settings.auto_start_listener);
    assert!((settings.max_volume - 1.0).abs() < f32::EPSILON);
    assert!(settings.last_connected_devices.is_empty());
}

#[test]
fn test_settings_json_field_names() {
    let settings = Settings {
        udp_port: 5000,
        bluetooth_device_name: Some("Speaker".to_string()),
        ..Settings::default()
    };

    let json = serde_json::to_value(&settings).unwrap();
    assert_eq!(json["udpPort"], 5000);
    assert_eq!(json["bluetoothDeviceName"], "Speaker");
    assert!(json.get("udp_port").is_none());
}

#[test]
fn test_settings_remember_device_caps_at_five() {
    let mut settings = Settings::default();
    for name in ["a", "b", "c", "d", "e", "f"] {
        settings.remember_device(name);
    }

    assert_eq!(settings.last_connected_devices.len(), 5);
    assert_eq!(settings.last_connected_devices[0], "f");
    assert!(!settings.last_connected_devices.contains(&"a".to_string()));
}

#[test]
fn test_settings_remember_device_dedupes() {
    let mut settings = Settings::default();
    settings.remember_device("a");
    settings.remember_device("b");
    settings.remember_device("a");

    assert_eq!(settings.last_connected_devices, vec!["a", "b"]);
}

#[test]
fn test_device_from_event() {
    let event = EspMessage {
        device_id: "ESP01".to_string(),
        button_pressed: true,
        timestamp_ms: 1_700_000_000_000,
        battery: Some(0.5),
    };

    let device = EspDevice::from_event(&event);
    assert_eq!(device.id, "ESP01");
    assert_eq!(device.name, "ESP01");
    assert_eq!(device.last_seen_ms, 1_700_000_000_000);
    assert_eq!(device.battery, Some(0.5));
}

#[test]
fn test_clip_ids_are_unique_and_ordered() {
    let a = AudioClip::next_id();
    let b = AudioClip::next_id();

    assert_ne!(a, b);

    let seq = |id: &str| -> u64 { id.rsplit('-').next().unwrap().parse().unwrap() };
    assert!(seq(&b) > seq(&a));
}

#[test]
fn test_clip_manifest_round_trip() {
    let clip = AudioClip {
        id: "1700000000000-1".to_string(),
        title: "Doorbell".to_string(),
        path: std::path::PathBuf::from("clips/1700000000000-1.mp3"),
        device_id: Some("ESP01".to_string()),
        loop_mode: true,
    };

    let json = serde_json::to_string(&clip).unwrap();
    assert!(json.contains("\"deviceId\""));
    assert!(json.contains("\"loopMode\""));

    let back: AudioClip = serde_json::from_str(&json).unwrap();
    assert_eq!(back, clip);
}

#[test]
fn test_epoch_millis_is_monotonic_enough() {
    let a = epoch_millis();
    let b = epoch_millis();
    assert!(b >= a);
    // Sanity: we are comfortably past 2020 in epoch millis
    assert!(a > 1_577_836_800_000);
}
