use super::*;

mod error_window_tests {
    use std::time::Duration;

    use super::ErrorTracker;

    #[test]
    fn test_trips_past_threshold() {
        let mut tracker = ErrorTracker::new(Duration::from_secs(30), 3);

        assert!(!tracker.record());
        assert!(!tracker.record());
        assert!(!tracker.record());
        assert!(tracker.record());
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_errors_age_out() {
        let mut tracker = ErrorTracker::new(Duration::from_secs(30), 3);
        for _ in 0..3 {
            assert!(!tracker.record());
        }

        tokio::time::advance(Duration::from_secs(31)).await;

        // The earlier errors are outside the window now.
        assert!(!tracker.record());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_inside_window_accumulate() {
        let mut tracker = ErrorTracker::new(Duration::from_secs(30), 3);
        for _ in 0..3 {
            assert!(!tracker.record());
            tokio::time::advance(Duration::from_secs(5)).await;
        }

        assert!(tracker.record());
    }

    #[test]
    fn test_reset_clears_window() {
        let mut tracker = ErrorTracker::new(Duration::from_secs(30), 2);
        assert!(!tracker.record());
        assert!(!tracker.record());

        tracker.reset();

        assert!(!tracker.record());
    }
}

mod listener_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::net::UdpSocket;

    use super::{ListenerState, UdpListener};
    use crate::bus::EventBus;
    use crate::error::ButtonBoxError;
    use crate::settings::{MemorySettingsStore, SettingsStore, StoreError};
    use crate::testing::TestSender;
    use crate::types::{EspDevice, ListenerConfig, Settings};

    fn fixture(
        port: u16,
        config: ListenerConfig,
    ) -> (Arc<UdpListener>, Arc<EventBus>, Arc<MemorySettingsStore>) {
        let settings = Arc::new(MemorySettingsStore::with_settings(Settings {
            udp_port: port,
            ..Settings::default()
        }));
        let bus = Arc::new(EventBus::new());
        let listener = Arc::new(UdpListener::new(settings.clone(), bus.clone(), config));
        (listener, bus, settings)
    }

    #[tokio::test]
    async fn test_start_binds_and_reports_port() {
        let (listener, _bus, _settings) = fixture(0, ListenerConfig::default());

        let port = listener.start().await.unwrap();

        assert!(port > 0);
        let status = listener.status();
        assert_eq!(status.state, ListenerState::Bound);
        assert_eq!(status.port, Some(port));
        assert!(listener.is_running());

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_starts_bind_once() {
        let (listener, _bus, _settings) = fixture(0, ListenerConfig::default());

        let (a, b) = tokio::join!(listener.start(), listener.start());

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(listener.status().state, ListenerState::Bound);

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_datagrams_reach_the_bus() {
        let (listener, bus, _settings) = fixture(0, ListenerConfig::default());
        let port = listener.start().await.unwrap();
        let mut rx = bus.subscribe();

        let sender = TestSender::new(([127, 0, 0, 1], port).into()).await.unwrap();
        sender.send(b"not a message").await.unwrap();
        sender.send_button("esp-1", true).await.unwrap();

        // The garbage datagram is dropped; only the parsed one arrives.
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.device_id, "esp-1");
        assert!(message.button_pressed);

        listener.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_conflict_error_clears_after_ttl() {
        let blocker = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();
        let (listener, _bus, _settings) = fixture(port, ListenerConfig::default());

        let err = listener.start().await.unwrap_err();
        assert!(matches!(err, ButtonBoxError::Bind { .. }));
        assert!(err.is_recoverable());

        let status = listener.status();
        assert_eq!(status.state, ListenerState::Error);
        assert!(status.error.is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;

        let status = listener.status();
        assert_eq!(status.state, ListenerState::Idle);
        assert!(status.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_window_trip_restarts() {
        let config = ListenerConfig::builder().error_threshold(3).build();
        let (listener, _bus, _settings) = fixture(0, config);
        listener.start().await.unwrap();

        for _ in 0..4 {
            listener.note_socket_error().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = listener.status();
        assert_eq!(status.state, ListenerState::Idle);
        assert!(status.error.is_some());

        tokio::time::sleep(Duration::from_secs(4)).await;

        let status = listener.status();
        assert_eq!(status.state, ListenerState::Bound);
        assert!(status.port.is_some());

        listener.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_scheduled_restart() {
        let config = ListenerConfig::builder().error_threshold(1).build();
        let (listener, _bus, _settings) = fixture(0, config);
        listener.start().await.unwrap();

        listener.note_socket_error().await;
        listener.note_socket_error().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        listener.stop().await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        let status = listener.status();
        assert_eq!(status.state, ListenerState::Idle);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (listener, _bus, _settings) = fixture(0, ListenerConfig::default());
        listener.start().await.unwrap();

        listener.stop().await;
        listener.stop().await;

        assert_eq!(listener.status().state, ListenerState::Idle);
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_stop_releases_the_port() {
        let (listener, _bus, _settings) = fixture(0, ListenerConfig::default());
        let port = listener.start().await.unwrap();

        listener.stop().await;

        assert!(UdpSocket::bind(("0.0.0.0", port)).await.is_ok());
    }

    #[tokio::test]
    async fn test_start_reads_port_from_settings_at_call_time() {
        let (listener, _bus, settings) = fixture(0, ListenerConfig::default());
        listener.start().await.unwrap();
        listener.stop().await;

        let probe = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let target = probe.local_addr().unwrap().port();
        drop(probe);
        settings
            .save(&Settings {
                udp_port: target,
                ..Settings::default()
            })
            .await
            .unwrap();

        let bound = listener.start().await.unwrap();

        assert_eq!(bound, target);
        listener.stop().await;
    }

    #[tokio::test]
    async fn test_status_watch_observes_transitions() {
        let (listener, _bus, _settings) = fixture(0, ListenerConfig::default());
        let mut rx = listener.subscribe();
        assert_eq!(rx.borrow().state, ListenerState::Idle);

        listener.start().await.unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().state, ListenerState::Bound);

        listener.stop().await;
    }

    struct FailingStore;

    #[async_trait]
    impl SettingsStore for FailingStore {
        async fn load(&self) -> Result<Settings, StoreError> {
            Err(StoreError::Serialization("document corrupt".to_string()))
        }

        async fn save(&self, _settings: &Settings) -> Result<(), StoreError> {
            Ok(())
        }

        async fn load_devices(&self) -> Result<Vec<EspDevice>, StoreError> {
            Ok(Vec::new())
        }

        async fn save_devices(&self, _devices: &[EspDevice]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unreadable_settings_fail_the_start() {
        let listener = Arc::new(UdpListener::new(
            Arc::new(FailingStore),
            Arc::new(EventBus::new()),
            ListenerConfig::default(),
        ));

        let err = listener.start().await.unwrap_err();

        assert!(matches!(err, ButtonBoxError::Storage { .. }));
        let status = listener.status();
        assert_eq!(status.state, ListenerState::Error);
        assert!(status.error.is_some());
    }
}
