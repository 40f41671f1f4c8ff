use anyhow::{bail, Context};
use energycore::config::NetworkConfig;
use energycore::discovery::{selection_message, DeviceIdentity};
use energycore::packet::PacketLayout;
use energycore::{DeviceConfig, MeasurementPacket};
use log::{info, warn};
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const SELECTION_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceivedPacket {
    pub packet_count: u32,
    pub measured_rate: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerReport {
    pub device: Ipv4Addr,
    pub greeting: String,
    pub packets: Vec<ReceivedPacket>,
}

/// Host side of the handshake: claims a device and consumes its stream.
pub struct Controller {
    network: NetworkConfig,
    layout: PacketLayout,
    local_ip: Ipv4Addr,
}

impl Controller {
    pub fn new(config: &DeviceConfig, local_ip: Ipv4Addr) -> Self {
        Self {
            network: config.network.clone(),
            layout: PacketLayout::from_config(config),
            local_ip,
        }
    }

    /// Waits for the first parseable announcement on the discovery port.
    pub async fn discover(&self) -> anyhow::Result<DeviceIdentity> {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.network.discovery_port);
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("binding discovery port {}", addr))?;
        let mut buf = [0u8; 256];
        loop {
            let (len, from) = socket
                .recv_from(&mut buf)
                .await
                .context("receiving announcement")?;
            let text = String::from_utf8_lossy(&buf[..len]);
            match DeviceIdentity::from_announcement(&text) {
                Some(identity) => {
                    info!(target: "controller", "found device {} ({})", identity.ip, identity.mac);
                    return Ok(identity);
                }
                None => warn!(target: "controller", "ignoring datagram from {}", from),
            }
        }
    }

    /// Sends `SELECTED <local ip>` until the device greets back.
    pub async fn select(&self, device: Ipv4Addr) -> anyhow::Result<String> {
        let greeting_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.network.greeting_port);
        let greetings = UdpSocket::bind(greeting_addr)
            .await
            .with_context(|| format!("binding greeting port {}", greeting_addr))?;
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("binding selection socket")?;
        let target = SocketAddrV4::new(device, self.network.selection_port);
        let message = selection_message(self.local_ip);

        let mut buf = [0u8; 256];
        for attempt in 1..=SELECTION_ATTEMPTS {
            socket
                .send_to(message.as_bytes(), target)
                .await
                .with_context(|| format!("sending selection to {}", target))?;
            info!(target: "controller", "sent {:?} to {} (attempt {})", message, target, attempt);

            if let Ok(received) =
                timeout(self.network.advertise_interval(), greetings.recv_from(&mut buf)).await
            {
                let (len, _) = received.context("receiving greeting")?;
                let greeting = String::from_utf8_lossy(&buf[..len]).into_owned();
                info!(target: "controller", "device says: {}", greeting);
                return Ok(greeting);
            }
        }
        bail!("no greeting from {} after {} attempts", device, SELECTION_ATTEMPTS)
    }

    /// Decodes measurement packets from `socket`, stopping after `limit`
    /// packets when one is given.
    pub async fn stream(
        &self,
        socket: &UdpSocket,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<ReceivedPacket>> {
        let mut buf = vec![0u8; self.layout.wire_len() + 1];
        let mut received = Vec::new();
        while limit.map_or(true, |limit| received.len() < limit) {
            let (len, from) = socket.recv_from(&mut buf).await.context("receiving packet")?;
            let packet = match MeasurementPacket::decode(&buf[..len], self.layout) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!(target: "controller", "dropping datagram from {}: {}", from, err);
                    continue;
                }
            };
            info!(
                target: "controller",
                "packet {} at {:.2} packets/s",
                packet.packet_count,
                packet.measured_output_rate
            );
            received.push(ReceivedPacket {
                packet_count: packet.packet_count,
                measured_rate: packet.measured_output_rate,
            });
        }
        Ok(received)
    }

    /// Full session: discover (unless `device` is given), select, stream.
    pub async fn run(
        &self,
        device: Option<Ipv4Addr>,
        limit: Option<usize>,
    ) -> anyhow::Result<ControllerReport> {
        let device = match device {
            Some(ip) => ip,
            None => self.discover().await?.ip,
        };
        let data_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.network.data_port);
        let data = UdpSocket::bind(data_addr)
            .await
            .with_context(|| format!("binding data port {}", data_addr))?;

        let greeting = self.select(device).await?;
        let packets = self.stream(&data, limit).await?;
        Ok(ControllerReport {
            device,
            greeting,
            packets,
        })
    }
}
