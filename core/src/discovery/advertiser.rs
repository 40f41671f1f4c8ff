use crate::config::NetworkConfig;
use crate::discovery::message::DeviceIdentity;
use crate::prelude::CoreResult;
use crate::session::SessionContext;
use log::{error, info};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Periodically broadcasts the device announcement until selected.
pub struct Advertiser {
    socket: UdpSocket,
    target: SocketAddrV4,
    announcement: String,
    interval: Duration,
    session: Arc<SessionContext>,
}

impl Advertiser {
    pub async fn bind(
        network: &NetworkConfig,
        identity: DeviceIdentity,
        session: Arc<SessionContext>,
    ) -> CoreResult<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            target: SocketAddrV4::new(network.broadcast_ip, network.discovery_port),
            announcement: identity.announcement(),
            interval: network.advertise_interval(),
            session,
        })
    }

    pub async fn announce(&self) -> CoreResult<usize> {
        let sent = self
            .socket
            .send_to(self.announcement.as_bytes(), self.target)
            .await?;
        Ok(sent)
    }

    pub async fn run(self) {
        loop {
            if self.session.is_selected() {
                info!(target: "discovery", "device selected, stopping announcements");
                break;
            }
            match self.announce().await {
                Ok(_) => info!(target: "discovery", "announced: {}", self.announcement),
                Err(err) => error!(target: "discovery", "error sending announcement: {}", err),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
