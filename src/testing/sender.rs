//! Minimal UDP sender for exercising a listener end to end

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// UDP sender aimed at one listener address
pub struct TestSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl TestSender {
    /// Bind an ephemeral local socket aimed at `target`
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be bound
    pub async fn new(target: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        Ok(Self { socket, target })
    }

    /// Send one raw datagram
    ///
    /// # Errors
    ///
    /// Returns error if the send fails
    pub async fn send(&self, payload: &[u8]) -> io::Result<()> {
        self.socket.send_to(payload, self.target).await?;
        Ok(())
    }

    /// Send a compact-format button message
    ///
    /// # Errors
    ///
    /// Returns error if the send fails
    pub async fn send_button(&self, device_id: &str, pressed: bool) -> io::Result<()> {
        let state = if pressed { "1" } else { "0" };
        self.send(format!("BUTTON:{device_id}:{state}").as_bytes())
            .await
    }

    /// Send a structured-format button message
    ///
    /// # Errors
    ///
    /// Returns error if the send fails
    pub async fn send_structured(
        &self,
        device_id: &str,
        pressed: bool,
        battery: Option<f32>,
    ) -> io::Result<()> {
        let payload = match battery {
            Some(level) => format!(
                r#"{{"deviceId":"{device_id}","buttonPressed":{pressed},"batteryLevel":{level}}}"#
            ),
            None => format!(r#"{{"deviceId":"{device_id}","buttonPressed":{pressed}}}"#),
        };
        self.send(payload.as_bytes()).await
    }
}
