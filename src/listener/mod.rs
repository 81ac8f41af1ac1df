//! UDP listener socket management
//!
//! One lock guards every lifecycle transition, so concurrent starts
//! cannot double-bind a port. Bind failures surface as a transient
//! error on the status watch and clear on their own. Once bound,
//! socket errors feed a sliding window; tripping it stops the listener
//! and schedules an automatic restart.

use std::io;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bus::EventBus;
use crate::error::{ButtonBoxError, Result};
use crate::protocol::parse_datagram;
use crate::settings::SettingsStore;
use crate::types::{epoch_millis, ListenerConfig};

mod error_window;

#[cfg(test)]
mod tests;

pub use error_window::ErrorTracker;

/// Listener lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// No socket bound
    Idle,
    /// Bind in progress
    Binding,
    /// Socket bound, receive loop running
    Bound,
    /// Last start failed; the message stays visible until it expires
    Error,
    /// Teardown in progress
    Closing,
}

/// Status snapshot published on the listener's watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerStatus {
    /// Current lifecycle state
    pub state: ListenerState,
    /// Bound port while [`ListenerState::Bound`]
    pub port: Option<u16>,
    /// Transient error message, if one is visible
    pub error: Option<String>,
}

impl ListenerStatus {
    fn idle() -> Self {
        Self {
            state: ListenerState::Idle,
            port: None,
            error: None,
        }
    }
}

impl Default for ListenerStatus {
    fn default() -> Self {
        Self::idle()
    }
}

struct ListenerInner {
    socket: Option<Arc<UdpSocket>>,
    recv_task: Option<JoinHandle<()>>,
    restart_timer: Option<JoinHandle<()>>,
    error_clear: Option<JoinHandle<()>>,
    tracker: ErrorTracker,
}

/// UDP listener feeding button datagrams onto the bus
///
/// The bound port comes from the settings store at each `start()`, so a
/// persisted port change takes effect on the next stop/start cycle.
pub struct UdpListener {
    inner: Mutex<ListenerInner>,
    status_tx: watch::Sender<ListenerStatus>,
    status_rx: watch::Receiver<ListenerStatus>,
    settings: Arc<dyn SettingsStore>,
    bus: Arc<EventBus>,
    config: ListenerConfig,
}

impl UdpListener {
    /// Create an idle listener
    #[must_use]
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        bus: Arc<EventBus>,
        config: ListenerConfig,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(ListenerStatus::default());
        let tracker = ErrorTracker::new(config.error_window, config.error_threshold);
        Self {
            inner: Mutex::new(ListenerInner {
                socket: None,
                recv_task: None,
                restart_timer: None,
                error_clear: None,
                tracker,
            }),
            status_tx,
            status_rx,
            settings,
            bus,
            config,
        }
    }

    /// Bind the configured port and start receiving
    ///
    /// Reads `udp_port` from the settings store at call time and returns
    /// the bound port (useful when the configured port is 0). Calling
    /// `start()` on a bound listener returns the existing port without
    /// rebinding.
    ///
    /// # Errors
    ///
    /// Returns error if the settings cannot be read or the port cannot be
    /// bound. Bind failures also surface on the status watch as a
    /// transient error that clears after [`ListenerConfig::error_ttl`].
    pub async fn start(self: &Arc<Self>) -> Result<u16> {
        let mut inner = self.inner.lock().await;

        let current = self.status_rx.borrow().clone();
        match (current.state, current.port) {
            (ListenerState::Bound, Some(port)) => {
                debug!(port, "listener already bound");
                return Ok(port);
            }
            (ListenerState::Binding | ListenerState::Closing, _) => {
                return Err(ButtonBoxError::InvalidState {
                    message: "listener is mid-transition".to_string(),
                    current_state: format!("{:?}", current.state),
                });
            }
            _ => {}
        }

        if let Some(clear) = inner.error_clear.take() {
            clear.abort();
        }

        self.publish(ListenerStatus {
            state: ListenerState::Binding,
            port: None,
            error: None,
        });

        let port = match self.settings.load().await {
            Ok(settings) => settings.udp_port,
            Err(e) => {
                let message = format!("failed to load settings: {e}");
                warn!("{message}");
                self.publish(ListenerStatus {
                    state: ListenerState::Error,
                    port: None,
                    error: Some(message),
                });
                inner.error_clear = Some(self.spawn_error_clear());
                return Err(e.into());
            }
        };

        let bound = async {
            let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
            let local_port = socket.local_addr()?.port();
            Ok::<_, io::Error>((socket, local_port))
        }
        .await;

        let (socket, local_port) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                let message = format!("failed to bind UDP port {port}: {e}");
                warn!("{message}");
                self.publish(ListenerStatus {
                    state: ListenerState::Error,
                    port: None,
                    error: Some(message),
                });
                inner.error_clear = Some(self.spawn_error_clear());
                return Err(ButtonBoxError::Bind { port, source: e });
            }
        };

        let socket = Arc::new(socket);
        inner.tracker.reset();
        inner.socket = Some(Arc::clone(&socket));
        let listener = Arc::clone(self);
        inner.recv_task = Some(tokio::spawn(async move {
            listener.recv_loop(socket).await;
        }));

        self.publish(ListenerStatus {
            state: ListenerState::Bound,
            port: Some(local_port),
            error: None,
        });
        info!(port = local_port, "UDP listener bound");
        Ok(local_port)
    }

    /// Stop receiving and release the port
    ///
    /// Cancels any pending automatic restart. The port is unbound before
    /// this returns, so a follow-up `start()` on the same port cannot
    /// collide with the old socket. Stopping an idle listener only clears
    /// leftover transient state.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
    }

    /// Subscribe to status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ListenerStatus> {
        self.status_rx.clone()
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> ListenerStatus {
        self.status_rx.borrow().clone()
    }

    /// Whether the listener is bound and receiving
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status_rx.borrow().state == ListenerState::Bound
    }

    async fn recv_loop(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    trace!(%addr, len, "datagram received");
                    if let Some(message) = parse_datagram(&buf[..len], epoch_millis()) {
                        self.bus.emit(message);
                    }
                }
                Err(e) => {
                    warn!("socket receive error: {e}");
                    if self.note_socket_error().await {
                        break;
                    }
                }
            }
        }
    }

    /// Record one socket error, returning `true` when the window tripped
    /// and a restart has been scheduled
    async fn note_socket_error(self: &Arc<Self>) -> bool {
        let (tripped, socket) = {
            let mut inner = self.inner.lock().await;
            (inner.tracker.record(), inner.socket.clone())
        };
        if !tripped {
            return false;
        }

        if let Some(socket) = socket {
            warn!(
                "more than {} socket errors in {:?}, restarting listener",
                self.config.error_threshold, self.config.error_window
            );
            let listener = Arc::clone(self);
            tokio::spawn(async move { listener.restart_after_errors(socket).await });
        }
        true
    }

    async fn restart_after_errors(self: Arc<Self>, erred: Arc<UdpSocket>) {
        let mut inner = self.inner.lock().await;
        let still_current = inner
            .socket
            .as_ref()
            .is_some_and(|socket| Arc::ptr_eq(socket, &erred));
        if !still_current {
            // Stopped or rebound since the window tripped.
            return;
        }

        self.stop_locked(&mut inner).await;
        self.publish(ListenerStatus {
            state: ListenerState::Idle,
            port: None,
            error: Some("restarting after repeated socket errors".to_string()),
        });

        let listener = Arc::clone(&self);
        inner.restart_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(listener.config.restart_delay).await;
            if let Err(e) = listener.start_boxed().await {
                warn!("listener restart failed: {e}");
            }
        }));
        info!(delay = ?self.config.restart_delay, "listener restart scheduled");
    }

    /// `start()` boxed behind a concrete future type so the restart task
    /// can await it without a `Send` inference cycle through the opaque
    /// `async fn` future.
    fn start_boxed(
        self: Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<u16>> + Send>> {
        Box::pin(async move { self.start().await })
    }

    async fn stop_locked(&self, inner: &mut ListenerInner) {
        if let Some(timer) = inner.restart_timer.take() {
            timer.abort();
        }
        if let Some(clear) = inner.error_clear.take() {
            clear.abort();
        }

        let Some(task) = inner.recv_task.take() else {
            // Nothing bound. Clear leftover transient state so observers
            // see a clean Idle.
            if *self.status_rx.borrow() != ListenerStatus::idle() {
                self.publish(ListenerStatus::idle());
            }
            return;
        };

        let port = self.status_rx.borrow().port;
        self.publish(ListenerStatus {
            state: ListenerState::Closing,
            port,
            error: None,
        });

        // Abort before awaiting: the receive task may be parked waiting
        // for the lock this caller holds.
        task.abort();
        let _ = task.await;
        inner.socket = None;

        self.publish(ListenerStatus::idle());
        info!("UDP listener stopped");
    }

    fn spawn_error_clear(self: &Arc<Self>) -> JoinHandle<()> {
        let listener = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(listener.config.error_ttl).await;
            listener.publish(ListenerStatus::idle());
        })
    }

    fn publish(&self, status: ListenerStatus) {
        // Ignore error if no receivers
        let _ = self.status_tx.send(status);
    }
}
