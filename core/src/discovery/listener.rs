use crate::discovery::message::parse_selection;
use crate::prelude::{CoreResult, StreamControl};
use crate::session::SessionContext;
use log::{error, info, warn};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

const RECV_BUFFER_LEN: usize = 128;

/// Result of a completed handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub controller: SocketAddr,
    pub destination: Ipv4Addr,
}

/// Waits for the controller's `SELECTED <ip>` message on the selection port.
pub struct Listener {
    socket: UdpSocket,
    session: Arc<SessionContext>,
    control: Arc<dyn StreamControl>,
    greeting: String,
    greeting_port: u16,
    restart_delay: Duration,
}

impl Listener {
    pub async fn bind(
        addr: SocketAddrV4,
        session: Arc<SessionContext>,
        control: Arc<dyn StreamControl>,
    ) -> CoreResult<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            session,
            control,
            greeting: String::new(),
            greeting_port: 0,
            restart_delay: Duration::ZERO,
        })
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>, port: u16) -> Self {
        self.greeting = greeting.into();
        self.greeting_port = port;
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn local_addr(&self) -> CoreResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Applies a datagram to the session. Returns the selection when the
    /// payload was a valid `SELECTED <ip>` message; anything else is ignored.
    pub fn handle_datagram(&self, payload: &[u8], from: SocketAddr) -> Option<Selection> {
        let destination = match parse_selection(payload) {
            Ok(destination) => destination,
            Err(err) => {
                warn!(target: "discovery", "ignoring datagram from {}: {}", from, err);
                return None;
            }
        };
        if let Err(err) = self.session.select(from, destination) {
            warn!(target: "discovery", "ignoring selection from {}: {}", from, err);
            return None;
        }
        info!(
            target: "discovery",
            "selected by {} (streaming to {})",
            from,
            destination
        );
        Some(Selection {
            controller: from,
            destination,
        })
    }

    /// One-shot greeting to the new destination; nothing waits for a reply.
    pub async fn send_greeting(&self, destination: Ipv4Addr) -> CoreResult<()> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket
            .send_to(
                self.greeting.as_bytes(),
                SocketAddrV4::new(destination, self.greeting_port),
            )
            .await?;
        Ok(())
    }

    /// Receives until a valid selection arrives, then greets the controller
    /// and restarts streaming. Never returns without a selection.
    pub async fn run(self) -> Selection {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let selection = loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    error!(target: "discovery", "failed to receive selection: {}", err);
                    continue;
                }
            };
            if let Some(selection) = self.handle_datagram(&buf[..len], from) {
                break selection;
            }
        };

        match self.send_greeting(selection.destination).await {
            Ok(()) => info!(target: "discovery", "greeting sent to {}", selection.destination),
            Err(err) => error!(target: "discovery", "error sending greeting: {}", err),
        }

        tokio::time::sleep(self.restart_delay).await;
        info!(target: "discovery", "restarting streaming tasks");
        if let Err(err) = self.control.restart() {
            error!(target: "discovery", "failed to restart streaming: {}", err);
        }
        selection
    }
}
